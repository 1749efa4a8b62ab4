//! Kprobe handlers for TCP lifecycle capture
//!
//! Implements the eBPF programs attached to the four instrumented kernel
//! functions. Each invocation runs extract -> filter -> export once, on
//! whichever CPU executes the intercepted call.

use aya_ebpf::{macros::kprobe, programs::ProbeContext};
use aya_log_ebpf::warn;
use tcptap_common::{constants::*, EventKind, FilterMode, TcpEvent};

use crate::{
    maps::{filter_config, increment_stat, EVENTS, FILTER_PIDS},
    task::{get_comm, get_pid, get_ppid, get_timestamp},
};

/// Capture TCP connection establishment
///
/// Attached to: tcp_v4_connect
#[kprobe]
pub fn tcp_v4_connect(ctx: ProbeContext) -> u32 {
    match try_tcp_v4_connect(&ctx) {
        Ok(ret) => ret,
        Err(_) => 1,
    }
}

fn try_tcp_v4_connect(ctx: &ProbeContext) -> Result<u32, i64> {
    increment_stat(STAT_SEEN);
    capture_event(ctx, EventKind::Connect, 0)
}

/// Capture TCP send operations
///
/// Attached to: tcp_sendmsg
///
/// The third argument of tcp_sendmsg is the requested size in bytes.
#[kprobe]
pub fn tcp_sendmsg(ctx: ProbeContext) -> u32 {
    match try_tcp_sendmsg(&ctx) {
        Ok(ret) => ret,
        Err(_) => 1,
    }
}

fn try_tcp_sendmsg(ctx: &ProbeContext) -> Result<u32, i64> {
    increment_stat(STAT_SEEN);
    let size = msg_size(ctx)?;
    capture_event(ctx, EventKind::Send, size)
}

/// Capture TCP receive operations
///
/// Attached to: tcp_recvmsg
///
/// The third argument of tcp_recvmsg is the caller's buffer length.
#[kprobe]
pub fn tcp_recvmsg(ctx: ProbeContext) -> u32 {
    match try_tcp_recvmsg(&ctx) {
        Ok(ret) => ret,
        Err(_) => 1,
    }
}

fn try_tcp_recvmsg(ctx: &ProbeContext) -> Result<u32, i64> {
    increment_stat(STAT_SEEN);
    let size = msg_size(ctx)?;
    capture_event(ctx, EventKind::Recv, size)
}

/// Capture TCP connection teardown
///
/// Attached to: tcp_close
#[kprobe]
pub fn tcp_close(ctx: ProbeContext) -> u32 {
    match try_tcp_close(&ctx) {
        Ok(ret) => ret,
        Err(_) => 1,
    }
}

fn try_tcp_close(ctx: &ProbeContext) -> Result<u32, i64> {
    increment_stat(STAT_SEEN);
    capture_event(ctx, EventKind::Close, 0)
}

/// Reads the size argument shared by tcp_sendmsg and tcp_recvmsg.
///
/// Declining here aborts the capture before a record exists, so no
/// partial record can reach the filter or the channel.
#[inline(always)]
fn msg_size(ctx: &ProbeContext) -> Result<u32, i64> {
    let size: u64 = ctx.arg(2).ok_or(1i64)?;
    Ok(size as u32)
}

/// Assembles one record from the current task context, applies the
/// inclusion filter, and exports the record if accepted.
#[inline(always)]
fn capture_event(ctx: &ProbeContext, kind: EventKind, byte_count: u32) -> Result<u32, i64> {
    let pid = get_pid();
    let ppid = match get_ppid() {
        Some(ppid) => ppid,
        None => {
            // Recoverable: emit the record with the zero sentinel
            increment_stat(STAT_PARENT_MISS);
            warn!(ctx, "parent link unreadable for pid {}", pid);
            0
        }
    };

    let event = TcpEvent::new(kind, pid, ppid, byte_count, get_timestamp(), get_comm());

    let config = filter_config();
    // The membership lookup is only meaningful in PidSet mode
    let pid_listed = match config.mode {
        FilterMode::PidSet => unsafe { FILTER_PIDS.get(&pid).is_some() },
        _ => false,
    };
    if !config.accepts(&event, pid_listed) {
        increment_stat(STAT_FILTERED);
        return Ok(0);
    }

    EVENTS.output(ctx, &event, 0);
    increment_stat(STAT_ACCEPTED);

    Ok(0)
}
