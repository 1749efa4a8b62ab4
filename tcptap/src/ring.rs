//! Per-CPU SPSC event rings
//!
//! Userspace continuation of the per-CPU perf channel: one bounded ring
//! per CPU, written by that CPU's perf reader task and drained by a
//! single consumer. A push never blocks and never allocates past the
//! ring's fixed capacity; overflow drops the record and counts it.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use flume::{Receiver, Sender, TrySendError};
use tcptap_common::TcpEvent;

/// Writer half of one CPU's ring
pub struct RingWriter {
    cpu: u32,
    tx: Sender<TcpEvent>,
    dropped: Arc<AtomicU64>,
}

impl RingWriter {
    /// CPU this ring belongs to.
    pub fn cpu_id(&self) -> u32 {
        self.cpu
    }

    /// Attempts to enqueue one record.
    ///
    /// Returns false without blocking when the ring is full (the record
    /// is dropped and counted) or when the consumer is gone.
    pub fn push(&self, event: TcpEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// One CPU's lane as seen by the consumer
struct RingLane {
    cpu: u32,
    rx: Receiver<TcpEvent>,
    dropped: Arc<AtomicU64>,
}

/// Consumer half of the ring arena
///
/// Records come out in FIFO order per ring; no ordering is defined
/// across rings beyond the records' own timestamps.
pub struct RingConsumer {
    lanes: Vec<RingLane>,
}

impl RingConsumer {
    /// Drains every ring in CPU order, applying `f` to each record.
    /// Returns how many records were handed to `f`.
    pub fn drain(&self, mut f: impl FnMut(u32, TcpEvent)) -> usize {
        let mut drained = 0;
        for lane in &self.lanes {
            for event in lane.rx.drain() {
                f(lane.cpu, event);
                drained += 1;
            }
        }
        drained
    }

    /// Total records dropped on overflow across all rings.
    pub fn dropped(&self) -> u64 {
        self.lanes
            .iter()
            .map(|lane| lane.dropped.load(Ordering::Relaxed))
            .sum()
    }
}

/// Builds one bounded ring per CPU.
pub fn ring_arena(cpu_ids: &[u32], capacity: usize) -> (Vec<RingWriter>, RingConsumer) {
    let mut writers = Vec::with_capacity(cpu_ids.len());
    let mut lanes = Vec::with_capacity(cpu_ids.len());
    for &cpu in cpu_ids {
        let (tx, rx) = flume::bounded(capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        writers.push(RingWriter {
            cpu,
            tx,
            dropped: Arc::clone(&dropped),
        });
        lanes.push(RingLane { cpu, rx, dropped });
    }
    (writers, RingConsumer { lanes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tcptap_common::{comm_from_bytes, EventKind};

    fn event(seq: u32) -> TcpEvent {
        TcpEvent::new(
            EventKind::Send,
            100,
            1,
            seq,
            u64::from(seq) * 1_000,
            comm_from_bytes(b"test"),
        )
    }

    #[test]
    fn test_fifo_order_within_a_ring() {
        let (writers, consumer) = ring_arena(&[0], 16);
        for seq in 1..=5 {
            assert!(writers[0].push(event(seq)));
        }

        let mut seen = Vec::new();
        let drained = consumer.drain(|_, e| seen.push(e.byte_count));
        assert_eq!(drained, 5);
        assert_eq!(seen, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_overflow_drops_newest_and_counts() {
        let (writers, consumer) = ring_arena(&[0], 4);
        let mut accepted = 0;
        for seq in 1..=7 {
            if writers[0].push(event(seq)) {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 4);
        assert_eq!(consumer.dropped(), 3);

        // The oldest four records survive, still in order
        let mut seen = Vec::new();
        consumer.drain(|_, e| seen.push(e.byte_count));
        assert_eq!(seen, [1, 2, 3, 4]);
    }

    #[test]
    fn test_rings_are_independent_per_cpu() {
        let (writers, consumer) = ring_arena(&[0, 1], 2);
        // Fill CPU 0's ring past capacity; CPU 1 stays empty
        for seq in 1..=3 {
            writers[0].push(event(seq));
        }
        assert_eq!(consumer.dropped(), 1);

        // CPU 1 still accepts at full rate
        assert!(writers[1].push(event(10)));
        let mut by_cpu = Vec::new();
        consumer.drain(|cpu, e| by_cpu.push((cpu, e.byte_count)));
        assert_eq!(by_cpu, [(0, 1), (0, 2), (1, 10)]);
    }

    #[test]
    fn test_drain_after_consumer_pause_resumes_cleanly() {
        let (writers, consumer) = ring_arena(&[0], 4);
        for seq in 1..=4 {
            writers[0].push(event(seq));
        }
        assert_eq!(consumer.drain(|_, _| {}), 4);

        // Capacity is available again after the drain
        assert!(writers[0].push(event(9)));
        assert_eq!(consumer.drain(|_, _| {}), 1);
        assert_eq!(consumer.dropped(), 0);
    }
}
