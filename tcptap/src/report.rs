//! Capture accounting
//!
//! Running totals kept by the consumer, merged at shutdown with the
//! kernel-side counters and the aggregate drop count into one report.

use chrono::Utc;
use serde::Serialize;
use tcptap_common::{EventKind, TcpEvent};

/// Kernel-side capture counters summed across CPUs
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct KernelStats {
    /// Handler invocations that reached the extractor
    pub seen: u64,
    /// Records accepted by the filter
    pub accepted: u64,
    /// Records rejected by the filter
    pub filtered: u64,
    /// Parent-link reads that used the zero sentinel
    pub parent_miss: u64,
}

/// Per-kind delivery counts
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct KindBreakdown {
    pub connect: u64,
    pub send: u64,
    pub recv: u64,
    pub close: u64,
}

impl KindBreakdown {
    fn bump(&mut self, kind: EventKind) {
        match kind {
            EventKind::Connect => self.connect += 1,
            EventKind::Send => self.send += 1,
            EventKind::Recv => self.recv += 1,
            EventKind::Close => self.close += 1,
        }
    }
}

/// Totals for one capture run
#[derive(Debug, Clone, Serialize)]
pub struct CaptureReport {
    /// Wall-clock start of the capture (RFC 3339)
    pub started_at: String,
    /// Collection duration in seconds
    pub duration_seconds: u64,
    /// Records delivered to the consumer
    pub delivered: u64,
    /// Records carrying an unknown kind tag (never expected)
    pub unknown_kind: u64,
    /// Delivered records by kind
    pub kinds: KindBreakdown,
    /// Bytes requested across SEND records
    pub bytes_sent: u64,
    /// Bytes requested across RECV records
    pub bytes_received: u64,
    /// Records dropped on the way to the consumer: ring overflow plus
    /// kernel-reported perf loss
    pub dropped: u64,
    /// Kernel-side counters
    pub kernel: KernelStats,
}

impl CaptureReport {
    pub fn new() -> CaptureReport {
        CaptureReport {
            started_at: Utc::now().to_rfc3339(),
            duration_seconds: 0,
            delivered: 0,
            unknown_kind: 0,
            kinds: KindBreakdown::default(),
            bytes_sent: 0,
            bytes_received: 0,
            dropped: 0,
            kernel: KernelStats::default(),
        }
    }

    /// Accounts one delivered record.
    pub fn record(&mut self, event: &TcpEvent) {
        self.delivered += 1;
        match event.event_kind() {
            Some(kind) => {
                self.kinds.bump(kind);
                match kind {
                    EventKind::Send => self.bytes_sent += u64::from(event.byte_count),
                    EventKind::Recv => self.bytes_received += u64::from(event.byte_count),
                    _ => {}
                }
            }
            None => self.unknown_kind += 1,
        }
    }

    /// Folds in the end-of-run figures.
    pub fn finish(&mut self, duration_seconds: u64, dropped: u64, kernel: KernelStats) {
        self.duration_seconds = duration_seconds;
        self.dropped = dropped;
        self.kernel = kernel;
    }
}

impl Default for CaptureReport {
    fn default() -> CaptureReport {
        CaptureReport::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcptap_common::comm_from_bytes;

    fn event(kind: EventKind, bytes: u32) -> TcpEvent {
        TcpEvent::new(kind, 1, 0, bytes, 10, comm_from_bytes(b"curl"))
    }

    #[test]
    fn test_report_counts_kinds_and_bytes() {
        let mut report = CaptureReport::new();
        report.record(&event(EventKind::Connect, 0));
        report.record(&event(EventKind::Send, 512));
        report.record(&event(EventKind::Send, 100));
        report.record(&event(EventKind::Recv, 2048));
        report.record(&event(EventKind::Close, 0));

        assert_eq!(report.delivered, 5);
        assert_eq!(report.kinds.connect, 1);
        assert_eq!(report.kinds.send, 2);
        assert_eq!(report.kinds.recv, 1);
        assert_eq!(report.kinds.close, 1);
        assert_eq!(report.bytes_sent, 612);
        assert_eq!(report.bytes_received, 2048);
        assert_eq!(report.unknown_kind, 0);
    }

    #[test]
    fn test_unknown_kind_is_isolated() {
        let mut report = CaptureReport::new();
        let mut bad = event(EventKind::Send, 64);
        bad.kind = 200;
        report.record(&bad);

        assert_eq!(report.delivered, 1);
        assert_eq!(report.unknown_kind, 1);
        // An unknown tag must not leak into the byte totals
        assert_eq!(report.bytes_sent, 0);
    }

    #[test]
    fn test_finish_merges_end_of_run_figures() {
        let mut report = CaptureReport::new();
        report.finish(
            30,
            7,
            KernelStats {
                seen: 100,
                accepted: 60,
                filtered: 40,
                parent_miss: 2,
            },
        );

        assert_eq!(report.duration_seconds, 30);
        assert_eq!(report.dropped, 7);
        assert_eq!(report.kernel.seen, 100);
        assert_eq!(report.kernel.accepted, 60);
        assert_eq!(report.kernel.filtered, 40);
        assert_eq!(report.kernel.parent_miss, 2);
    }
}
