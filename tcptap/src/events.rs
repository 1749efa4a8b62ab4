//! Event stream plumbing
//!
//! One tokio task per CPU reads that CPU's perf buffer, decodes the
//! fixed-layout records, and pushes them onto the CPU's ring. A single
//! consumer task drains the rings on a short tick, renders each record,
//! and keeps the running report.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use aya::maps::{perf::AsyncPerfEventArray, MapData};
use bytes::BytesMut;
use log::{debug, info, warn};
use tcptap_common::TcpEvent;
use tokio::{sync::watch, task::JoinHandle, time::interval};

use crate::{
    render::Renderer,
    report::CaptureReport,
    ring::{RingConsumer, RingWriter},
};

/// Read buffers handed to each perf reader
const READ_BUFFERS: usize = 10;

/// How often the consumer drains the rings
const DRAIN_INTERVAL_MS: u64 = 100;

/// Spawns one perf reader task per ring writer.
///
/// `perf_lost` accumulates the kernel-reported lost-sample counts, the
/// part of the aggregate drop counter the rings cannot observe.
pub fn spawn_cpu_readers(
    mut perf_array: AsyncPerfEventArray<MapData>,
    writers: Vec<RingWriter>,
    perf_lost: Arc<AtomicU64>,
) -> Result<()> {
    info!("Spawning event readers for {} CPUs", writers.len());

    for writer in writers {
        let cpu_id = writer.cpu_id();
        let mut buf = perf_array
            .open(cpu_id, None)
            .with_context(|| format!("failed to open perf buffer for CPU {}", cpu_id))?;
        let lost = Arc::clone(&perf_lost);

        tokio::spawn(async move {
            // Pre-allocate buffers for reading events
            let mut buffers = (0..READ_BUFFERS)
                .map(|_| BytesMut::with_capacity(TcpEvent::SIZE))
                .collect::<Vec<_>>();

            loop {
                let events = match buf.read_events(&mut buffers).await {
                    Ok(events) => events,
                    Err(e) => {
                        warn!("Error reading events from CPU {}: {}", cpu_id, e);
                        continue;
                    }
                };

                if events.lost > 0 {
                    lost.fetch_add(events.lost as u64, Ordering::Relaxed);
                    debug!("CPU {}: {} samples lost before userspace", cpu_id, events.lost);
                }

                for buf in buffers.iter_mut().take(events.read) {
                    match TcpEvent::from_bytes(buf) {
                        Some(event) => {
                            // A full ring counts the drop itself
                            writer.push(event);
                        }
                        None => warn!("CPU {}: short perf sample ({} bytes)", cpu_id, buf.len()),
                    }
                }
            }
        });
    }

    Ok(())
}

/// Spawns the consumer task.
///
/// Runs until `shutdown` flips, performs a final drain, and returns the
/// report together with the ring-overflow drop count.
pub fn spawn_consumer(
    rings: RingConsumer,
    mut renderer: Renderer,
    mut shutdown: watch::Receiver<bool>,
    progress_interval: u64,
) -> JoinHandle<(CaptureReport, u64)> {
    tokio::spawn(async move {
        let mut report = CaptureReport::new();
        let mut drain_tick = interval(Duration::from_millis(DRAIN_INTERVAL_MS));
        let mut progress_tick = interval(Duration::from_secs(progress_interval.max(1)));

        loop {
            tokio::select! {
                _ = drain_tick.tick() => {
                    rings.drain(|_cpu, event| {
                        report.record(&event);
                        println!("{}", renderer.line(&event));
                    });
                }
                _ = progress_tick.tick() => {
                    info!(
                        "Progress: {} events delivered, {} dropped on overflow",
                        report.delivered,
                        rings.dropped()
                    );
                }
                _ = shutdown.changed() => {
                    // Final drain so nothing queued is lost on the way out
                    rings.drain(|_cpu, event| {
                        report.record(&event);
                        println!("{}", renderer.line(&event));
                    });
                    break;
                }
            }
        }

        let ring_dropped = rings.dropped();
        (report, ring_dropped)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{render::RenderMode, ring::ring_arena};
    use tcptap_common::{comm_from_bytes, EventKind};

    #[tokio::test]
    async fn test_consumer_drains_everything_before_exit() {
        let (writers, rings) = ring_arena(&[0], 16);
        for seq in 0..5u32 {
            let event = TcpEvent::new(
                EventKind::Send,
                100,
                1,
                64,
                u64::from(seq) * 1_000,
                comm_from_bytes(b"curl"),
            );
            assert!(writers[0].push(event));
        }

        let renderer = Renderer::new(RenderMode::Json);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let consumer = spawn_consumer(rings, renderer, shutdown_rx, 60);

        // The final drain on shutdown must catch records the ticks missed
        shutdown_tx.send(true).unwrap();
        let (report, ring_dropped) = consumer.await.unwrap();

        assert_eq!(report.delivered, 5);
        assert_eq!(report.kinds.send, 5);
        assert_eq!(ring_dropped, 0);
    }
}
