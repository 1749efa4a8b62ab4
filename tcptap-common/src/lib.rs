//! Shared types for the tcptap TCP lifecycle probes
//!
//! This crate defines the event wire format, the inclusion filter
//! configuration, and the constants shared between the eBPF kernel
//! programs and the userspace daemon.

#![no_std]

pub mod constants;
pub mod filter;
pub mod types;

// Re-export commonly used types
pub use constants::*;
pub use filter::{FilterConfig, FilterMode, FilterPolarity};
pub use types::{comm_from_bytes, EventKind, TcpEvent};
