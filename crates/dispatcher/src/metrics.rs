//! Dispatch metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Counters shared by every dispatch call on one dispatcher
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Chunk tasks currently running
    in_flight: AtomicUsize,
    /// Chunks handed to the service
    chunks_submitted: AtomicU64,
    /// Items accepted by the service
    items_sent: AtomicU64,
    /// Chunks the service rejected
    chunk_failures: AtomicU64,
    /// Rejections that were capacity refusals
    capacity_refusals: AtomicU64,
    /// Pacing sleeps taken
    pacing_sleeps: AtomicU64,
    /// Total time spent pacing, in microseconds
    paced_micros: AtomicU64,
    /// Chunk tasks that panicked
    task_panics: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn task_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn chunks_submitted(&self) -> u64 {
        self.chunks_submitted.load(Ordering::Relaxed)
    }

    pub fn items_sent(&self) -> u64 {
        self.items_sent.load(Ordering::Relaxed)
    }

    pub fn chunk_failures(&self) -> u64 {
        self.chunk_failures.load(Ordering::Relaxed)
    }

    pub fn capacity_refusals(&self) -> u64 {
        self.capacity_refusals.load(Ordering::Relaxed)
    }

    pub fn task_panics(&self) -> u64 {
        self.task_panics.load(Ordering::Relaxed)
    }

    /// Record a chunk accepted by the service
    pub fn record_success(&self, items: usize) {
        self.chunks_submitted.fetch_add(1, Ordering::Relaxed);
        self.items_sent.fetch_add(items as u64, Ordering::Relaxed);
    }

    /// Record a chunk rejected by the service
    pub fn record_failure(&self, capacity_refusal: bool) {
        self.chunks_submitted.fetch_add(1, Ordering::Relaxed);
        self.chunk_failures.fetch_add(1, Ordering::Relaxed);
        if capacity_refusal {
            self.capacity_refusals.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_pacing(&self, slept: Duration) {
        self.pacing_sleeps.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(slept.as_micros()).unwrap_or(u64::MAX);
        self.paced_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_task_panic(&self) {
        self.task_panics.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            in_flight: self.in_flight(),
            chunks_submitted: self.chunks_submitted(),
            items_sent: self.items_sent(),
            chunk_failures: self.chunk_failures(),
            capacity_refusals: self.capacity_refusals(),
            pacing_sleeps: self.pacing_sleeps.load(Ordering::Relaxed),
            paced: Duration::from_micros(self.paced_micros.load(Ordering::Relaxed)),
            task_panics: self.task_panics(),
        }
    }
}

/// Snapshot of dispatch metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub in_flight: usize,
    pub chunks_submitted: u64,
    pub items_sent: u64,
    pub chunk_failures: u64,
    pub capacity_refusals: u64,
    pub pacing_sleeps: u64,
    pub paced: Duration,
    pub task_panics: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = DispatchMetrics::new();
        metrics.record_success(20);
        metrics.record_success(5);
        metrics.record_failure(true);
        metrics.record_failure(false);
        metrics.record_pacing(Duration::from_millis(3));

        let snap = metrics.snapshot();
        assert_eq!(snap.chunks_submitted, 4);
        assert_eq!(snap.items_sent, 25);
        assert_eq!(snap.chunk_failures, 2);
        assert_eq!(snap.capacity_refusals, 1);
        assert_eq!(snap.pacing_sleeps, 1);
        assert_eq!(snap.paced, Duration::from_millis(3));
    }
}
