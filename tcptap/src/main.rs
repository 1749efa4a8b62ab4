//! tcptap - Userspace TCP Lifecycle Capture
//!
//! Loads the eBPF capture programs, attaches the four TCP kprobes,
//! reads the per-CPU event channel, and prints one line per delivered
//! event. Event lines go to stdout; everything else goes to the logger
//! on stderr, so `--json` output stays machine-readable.
//!
//! ## Usage
//!
//! ```bash
//! # Capture everything for 60 seconds
//! sudo ./tcptap --ebpf-object tcptap.o --duration 60
//!
//! # Only processes whose command name starts with 'p'
//! sudo ./tcptap --ebpf-object tcptap.o --comm-prefix p
//!
//! # Only two specific pids, as JSON lines
//! sudo ./tcptap --ebpf-object tcptap.o --pid 1234 --pid 5678 --json
//!
//! # Everything except one pid
//! sudo ./tcptap --ebpf-object tcptap.o --pid 1234 --pid-polarity reject
//! ```

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use aya::util::online_cpus;
use clap::Parser;
use log::{debug, info, warn};
use tcptap::{
    events::{spawn_consumer, spawn_cpu_readers},
    filter::FilterSpec,
    loader::ProbeSet,
    render::{RenderMode, Renderer},
    report::CaptureReport,
    ring::ring_arena,
};
use tcptap_common::FilterPolarity;
use tokio::{
    signal,
    sync::watch,
    time::{sleep, Instant},
};

/// TCP lifecycle capture probe using eBPF
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the compiled eBPF object file
    #[clap(long)]
    ebpf_object: PathBuf,

    /// Duration to run the capture (in seconds, 0 = until Ctrl-C)
    #[clap(short, long, default_value_t = 0)]
    duration: u64,

    /// Only capture processes whose command name starts with this character
    #[clap(long)]
    comm_prefix: Option<char>,

    /// Only capture the given pid (repeatable)
    #[clap(long = "pid")]
    pids: Vec<u32>,

    /// Membership polarity for --pid (accept or reject)
    #[clap(long, default_value = "accept")]
    pid_polarity: String,

    /// Print events as JSON lines instead of text
    #[clap(long)]
    json: bool,

    /// Per-CPU ring capacity in records
    #[clap(long, default_value_t = 4096)]
    ring_capacity: usize,

    /// Progress reporting interval in seconds
    #[clap(long, default_value_t = 10)]
    progress_interval: u64,

    /// Verbose logging
    #[clap(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    if args.ring_capacity == 0 {
        anyhow::bail!("Ring capacity must be >= 1");
    }
    let filter = resolve_filter(&args)?;

    info!("Starting TCP lifecycle capture...");
    info!(
        "   Duration: {}",
        if args.duration == 0 {
            "until Ctrl-C".to_string()
        } else {
            format!("{} seconds", args.duration)
        }
    );
    info!("   Filter: {}", filter.describe());
    info!("   Ring capacity: {} records per CPU", args.ring_capacity);

    // Load the eBPF object with the filter configuration patched in
    let mut probes = ProbeSet::load(&args.ebpf_object, &filter.config)?;

    // Initialize eBPF logger (non-fatal)
    probes.init_logger();

    // Attach all four kprobes, or none
    probes.attach()?;

    // Populate the membership set; it was created empty at load time
    if !filter.pids.is_empty() {
        let mut control = probes.take_filter_control()?;
        for &pid in &filter.pids {
            control
                .add(pid)
                .with_context(|| format!("failed to add pid {} to the filter set", pid))?;
        }
        info!("Filter set populated with {} pid(s)", filter.pids.len());
    }

    // Per-CPU plumbing: perf readers feeding bounded rings
    let cpus = online_cpus()
        .map_err(|(_, error)| error)
        .context("failed to enumerate online CPUs")?;
    let (writers, rings) = ring_arena(&cpus, args.ring_capacity);
    let perf_lost = Arc::new(AtomicU64::new(0));
    let perf_array = probes.take_event_array()?;
    spawn_cpu_readers(perf_array, writers, Arc::clone(&perf_lost))?;

    let renderer = Renderer::new(if args.json {
        RenderMode::Json
    } else {
        RenderMode::Text
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = spawn_consumer(rings, renderer, shutdown_rx, args.progress_interval);

    info!("Capturing events...");

    // Run for the requested duration or until interrupted
    let start_time = Instant::now();
    if args.duration > 0 {
        tokio::select! {
            _ = sleep(Duration::from_secs(args.duration)) => {
                info!("Duration reached, shutting down...");
            }
            _ = signal::ctrl_c() => {
                info!("Interrupted, shutting down...");
            }
        }
    } else {
        signal::ctrl_c().await?;
        info!("Interrupted, shutting down...");
    }
    let elapsed = start_time.elapsed().as_secs();

    // Unhook first so the stream quiesces, then let the readers flush
    // what the perf pages still hold before the final drain. A detach
    // error must not cost us the report; the counters are still there.
    if let Err(e) = probes.detach() {
        warn!("Detach failed: {}", e);
    }
    sleep(Duration::from_millis(200)).await;

    let _ = shutdown_tx.send(true);
    let (mut report, ring_dropped) = consumer.await?;

    let kernel = probes.kernel_stats()?;
    let dropped = ring_dropped + perf_lost.load(Ordering::Relaxed);
    debug!(
        "drop breakdown: {} ring overflow, {} perf loss",
        ring_dropped,
        perf_lost.load(Ordering::Relaxed)
    );

    report.finish(elapsed, dropped, kernel);
    print_summary(&report);

    Ok(())
}

/// Resolves the filter flags into one configuration.
///
/// The prefix and membership filters are alternatives, never combined.
fn resolve_filter(args: &Args) -> Result<FilterSpec> {
    let polarity = match args.pid_polarity.to_lowercase().as_str() {
        "accept" => FilterPolarity::AcceptListed,
        "reject" => FilterPolarity::RejectListed,
        _ => anyhow::bail!(
            "Unsupported polarity: {}. Use accept or reject",
            args.pid_polarity
        ),
    };

    match (args.comm_prefix, args.pids.is_empty()) {
        (Some(_), false) => {
            anyhow::bail!("--comm-prefix and --pid are mutually exclusive; pick one filter")
        }
        (Some(prefix), true) => FilterSpec::comm_prefix(prefix),
        (None, false) => Ok(FilterSpec::pid_set(args.pids.clone(), polarity)),
        (None, true) => Ok(FilterSpec::all()),
    }
}

fn print_summary(report: &CaptureReport) {
    info!("");
    info!("============================================");
    info!("             Capture Summary");
    info!("============================================");
    info!("");
    info!("  Started:     {}", report.started_at);
    info!("  Duration:    {} seconds", report.duration_seconds);
    info!("  Delivered:   {}", report.delivered);
    info!("  Dropped:     {}", report.dropped);
    info!("");
    info!("  Event Kind Breakdown:");
    info!("    CONNECT: {:>10}", report.kinds.connect);
    info!(
        "    SEND:    {:>10}  ({} bytes)",
        report.kinds.send, report.bytes_sent
    );
    info!(
        "    RECV:    {:>10}  ({} bytes)",
        report.kinds.recv, report.bytes_received
    );
    info!("    CLOSE:   {:>10}", report.kinds.close);
    if report.unknown_kind > 0 {
        info!("    UNKNOWN: {:>10}", report.unknown_kind);
    }
    info!("");
    info!("  Kernel Counters:");
    info!("    seen:        {:>10}", report.kernel.seen);
    info!("    accepted:    {:>10}", report.kernel.accepted);
    info!("    filtered:    {:>10}", report.kernel.filtered);
    info!("    parent miss: {:>10}", report.kernel.parent_miss);
    info!("");
    info!("============================================");
}
