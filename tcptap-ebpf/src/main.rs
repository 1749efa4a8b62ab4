//! tcptap - Kernel Space TCP Lifecycle Capture
//!
//! Kprobe programs that intercept TCP connection establishment, send,
//! receive, and close. Each handler assembles a fixed-layout event record
//! from the current task context, applies the inclusion filter, and
//! exports accepted records to userspace through a per-CPU perf event
//! array. Handlers run to completion with no loops, no allocation, and
//! no blocking.
//!
//! ## Architecture
//!
//! ```text
//! tcp_v4_connect() -> CONNECT record
//! tcp_sendmsg()    -> SEND record (byte count from the size argument)
//! tcp_recvmsg()    -> RECV record (byte count from the size argument)
//! tcp_close()      -> CLOSE record
//!                      |
//!                      v
//!      extract task context -> inclusion filter -> EVENTS perf array
//!                                                  (read by the daemon)
//! ```
//!
//! ## Usage
//!
//! This program must be compiled for the bpfel-unknown-none target:
//!
//! ```bash
//! cargo build --release --target=bpfel-unknown-none
//! ```
//!
//! The compiled bytecode is then loaded by the userspace daemon.

#![no_std]
#![no_main]

mod handlers;
mod maps;
mod task;
mod vmlinux;

// Re-export kprobe functions so they're visible to the loader
pub use handlers::{tcp_close, tcp_recvmsg, tcp_sendmsg, tcp_v4_connect};

// Re-export maps for verification
pub use maps::{EVENTS, FILTER_PIDS, STATS};

#[cfg(not(test))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    // eBPF programs cannot panic - this should never be reached
    // The verifier should catch any potential panics
    loop {}
}

// bpf_probe_read_kernel and bpf_ktime_get_ns are GPL-gated helpers
#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 13] = *b"Dual MIT/GPL\0";
