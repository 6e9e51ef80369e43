//! Relay run statistics.

use std::time::Duration;

use contracts::DispatchMode;
use dispatcher::MetricsSnapshot;
use observability::StatsSummary;

/// Statistics from one relay run
#[derive(Debug, Clone)]
pub struct RelayStats {
    pub mode: DispatchMode,

    /// Items in the batch
    pub items: usize,

    /// Items the service accepted
    pub sent: usize,

    /// Items reported back as unsent (parallel mode)
    pub unsent_items: usize,

    /// One line per failed chunk
    pub failures: Vec<String>,

    /// Wall-clock duration of the dispatch call
    pub duration: Duration,

    /// Dispatcher counters at the end of the run
    pub dispatch: MetricsSnapshot,

    /// Gaps between chunk arrivals at the service
    pub submission_gaps_ms: StatsSummary,
}

impl RelayStats {
    pub fn new(mode: DispatchMode, items: usize) -> Self {
        Self {
            mode,
            items,
            sent: 0,
            unsent_items: 0,
            failures: Vec::new(),
            duration: Duration::ZERO,
            dispatch: MetricsSnapshot::default(),
            submission_gaps_ms: StatsSummary::default(),
        }
    }

    /// Items accepted per second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.sent as f64 / secs
        } else {
            0.0
        }
    }

    /// Whether every item reached the service
    pub fn is_complete(&self) -> bool {
        self.sent == self.items
    }

    pub fn print_summary(&self) {
        println!("\n=== Relay Statistics ===\n");

        println!("Overview");
        println!("  Mode: {:?}", self.mode);
        println!("  Duration: {:.3}s", self.duration.as_secs_f64());
        println!("  Items sent: {} / {}", self.sent, self.items);
        println!("  Throughput: {:.2} items/s", self.throughput());

        println!("\nDispatch");
        println!("  Chunks submitted: {}", self.dispatch.chunks_submitted);
        println!("  Chunk failures: {}", self.dispatch.chunk_failures);
        println!("  Capacity refusals: {}", self.dispatch.capacity_refusals);
        println!(
            "  Pacing sleeps: {} ({:.3}s total)",
            self.dispatch.pacing_sleeps,
            self.dispatch.paced.as_secs_f64()
        );
        println!("  Submission gaps (ms): {}", self.submission_gaps_ms);

        if !self.failures.is_empty() {
            println!("\nFailures");
            for failure in &self.failures {
                println!("  - {failure}");
            }
        }
        println!();
    }
}
