//! Event wire format shared between kernel and userspace
//!
//! These structures must be repr(C) to ensure consistent memory layout
//! between eBPF programs and userspace code. The layout is versionless;
//! both sides are rebuilt together when it changes.

use crate::constants::COMM_LEN;

/// Kind of TCP lifecycle event
///
/// The numeric tags are part of the wire format.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// tcp_v4_connect entered
    Connect = 1,
    /// tcp_sendmsg entered
    Send = 2,
    /// tcp_recvmsg entered
    Recv = 3,
    /// tcp_close entered
    Close = 4,
}

impl EventKind {
    /// Decodes a raw wire tag. Unknown tags never originate from the
    /// capture path but a consumer must not trust that.
    pub const fn from_raw(raw: u8) -> Option<EventKind> {
        match raw {
            1 => Some(EventKind::Connect),
            2 => Some(EventKind::Send),
            3 => Some(EventKind::Recv),
            4 => Some(EventKind::Close),
            _ => None,
        }
    }

    /// Short uppercase label used by the renderer.
    pub const fn label(self) -> &'static str {
        match self {
            EventKind::Connect => "CONNECT",
            EventKind::Send => "SEND",
            EventKind::Recv => "RECV",
            EventKind::Close => "CLOSE",
        }
    }
}

/// TCP lifecycle event sent from kernel to userspace
///
/// One record per intercepted call that passed the inclusion filter.
/// Records are built on the handler stack and never retained in-kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TcpEvent {
    /// Monotonic clock reading at capture time (nanoseconds)
    pub timestamp_ns: u64,
    /// Thread group id of the task executing the intercepted call
    pub pid: u32,
    /// Thread group id of that task's parent; 0 when the parent link
    /// could not be read
    pub ppid: u32,
    /// Size argument of the intercepted call; 0 for connect/close
    pub byte_count: u32,
    /// Raw event kind tag (see EventKind)
    pub kind: u8,
    /// Executable name of the task, fixed width, zero padded, not
    /// guaranteed NUL-terminated
    pub comm: [u8; COMM_LEN],
    /// Padding for alignment
    pub _padding: [u8; 3],
}

impl TcpEvent {
    /// Wire size of one record.
    pub const SIZE: usize = core::mem::size_of::<TcpEvent>();

    /// Assembles a fully-populated record. All capture sites go through
    /// this constructor so no partial record can exist.
    pub const fn new(
        kind: EventKind,
        pid: u32,
        ppid: u32,
        byte_count: u32,
        timestamp_ns: u64,
        comm: [u8; COMM_LEN],
    ) -> TcpEvent {
        TcpEvent {
            timestamp_ns,
            pid,
            ppid,
            byte_count,
            kind: kind as u8,
            comm,
            _padding: [0; 3],
        }
    }

    /// Typed view of the raw kind tag.
    pub const fn event_kind(&self) -> Option<EventKind> {
        EventKind::from_raw(self.kind)
    }

    /// Decodes one record from the start of a byte buffer, or None when
    /// the buffer is shorter than the wire size.
    pub fn from_bytes(buf: &[u8]) -> Option<TcpEvent> {
        if buf.len() < Self::SIZE {
            return None;
        }
        let ptr = buf.as_ptr() as *const TcpEvent;
        Some(unsafe { ptr.read_unaligned() })
    }
}

/// Builds a fixed-width command name from raw bytes, truncating or
/// zero-padding to `COMM_LEN`.
pub fn comm_from_bytes(name: &[u8]) -> [u8; COMM_LEN] {
    let mut comm = [0u8; COMM_LEN];
    let n = name.len().min(COMM_LEN);
    comm[..n].copy_from_slice(&name[..n]);
    comm
}

// Compile-time layout checks
// These will fail to compile if the wire format drifts
const _: () = {
    assert!(core::mem::size_of::<TcpEvent>() == 40);
    assert!(core::mem::offset_of!(TcpEvent, timestamp_ns) == 0);
    assert!(core::mem::offset_of!(TcpEvent, pid) == 8);
    assert!(core::mem::offset_of!(TcpEvent, ppid) == 12);
    assert!(core::mem::offset_of!(TcpEvent, byte_count) == 16);
    assert!(core::mem::offset_of!(TcpEvent, kind) == 20);
    assert!(core::mem::offset_of!(TcpEvent, comm) == 21);
    assert!(core::mem::size_of::<TcpEvent>() % core::mem::align_of::<TcpEvent>() == 0);
};

// Implement Aya's Pod trait for userspace usage
#[cfg(feature = "userspace")]
mod userspace_impls {
    use super::*;

    // Pod trait implementations for reading from perf buffers in userspace
    unsafe impl aya::Pod for TcpEvent {}
}
