//! Dispatch metric recording
//!
//! Thin wrappers over the `metrics` facade. They are no-ops until a recorder
//! (e.g. the Prometheus exporter installed by [`crate::init`]) is present.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Record the outcome of one chunk submission
pub fn record_chunk_outcome(mode: &'static str, items: usize, success: bool, refused: bool) {
    let status = match (success, refused) {
        (true, _) => "success",
        (false, true) => "refused",
        (false, false) => "failure",
    };
    counter!("batch_relay_chunks_total", "mode" => mode, "status" => status).increment(1);
    histogram!("batch_relay_chunk_items", "mode" => mode).record(items as f64);
    if success {
        counter!("batch_relay_items_sent_total", "mode" => mode).increment(items as u64);
    }
}

/// Record time spent sleeping to respect the rate window
pub fn record_pacing_sleep(mode: &'static str, slept: Duration) {
    counter!("batch_relay_pacing_sleeps_total", "mode" => mode).increment(1);
    histogram!("batch_relay_pacing_sleep_ms", "mode" => mode).record(slept.as_secs_f64() * 1000.0);
}

/// Record the number of chunk tasks currently running
pub fn record_in_flight(in_flight: usize) {
    gauge!("batch_relay_chunks_in_flight").set(in_flight as f64);
}

/// Record the end of one dispatch call
pub fn record_dispatch_completed(mode: &'static str, chunks: usize, elapsed: Duration) {
    counter!("batch_relay_dispatch_calls_total", "mode" => mode).increment(1);
    histogram!("batch_relay_dispatch_chunks", "mode" => mode).record(chunks as f64);
    histogram!("batch_relay_dispatch_duration_ms", "mode" => mode)
        .record(elapsed.as_secs_f64() * 1000.0);
}

/// Online min/max/mean/variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance, zero below two samples
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.mean,
            std_dev: self.variance().sqrt(),
        }
    }
}

/// Frozen view of [`RunningStats`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "N/A");
        }
        write!(
            f,
            "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
            self.min, self.max, self.mean, self.std_dev, self.count
        )
    }
}
