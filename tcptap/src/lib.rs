//! tcptap Userspace Library
//!
//! Provides reusable components for loading the TCP lifecycle capture
//! probes and consuming their event stream.

pub mod events;
pub mod filter;
pub mod loader;
pub mod render;
pub mod report;
pub mod ring;

pub use events::{spawn_consumer, spawn_cpu_readers};
pub use filter::{FilterControl, FilterSpec};
pub use loader::{AttachState, ProbeError, ProbeSet, TCP_ENTRY_POINTS};
pub use render::{RenderMode, Renderer};
pub use report::{CaptureReport, KernelStats};
pub use ring::{ring_arena, RingConsumer, RingWriter};
