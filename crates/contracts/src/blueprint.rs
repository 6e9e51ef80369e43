//! RelayBlueprint - Config Loader output
//!
//! Describes a complete relay run: the downstream service contract, how the
//! dispatcher drives it, and the workload to push through.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::RateLimits;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete relay configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RelayBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Downstream service settings
    #[validate(nested)]
    pub service: ServiceConfig,

    /// Dispatcher settings
    #[serde(default)]
    #[validate(nested)]
    pub dispatcher: DispatchSettings,

    /// Workload settings
    #[serde(default)]
    #[validate(nested)]
    pub workload: WorkloadConfig,
}

impl RelayBlueprint {
    /// Chunks the workload splits into, 0 when the limit is invalid
    pub fn chunk_count(&self) -> usize {
        match self.service.rate_limits().chunk_size() {
            Some(size) => self.workload.items.div_ceil(size),
            None => 0,
        }
    }

    /// Lower bound on dispatch time: one period between consecutive chunks
    pub fn minimum_duration(&self) -> Duration {
        let gaps = self.chunk_count().saturating_sub(1);
        Duration::from_millis(self.service.period_ms.saturating_mul(gaps as u64))
    }
}

/// Downstream service contract plus simulated behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServiceConfig {
    /// Maximum items accepted per period
    #[validate(range(min = 1, message = "limit must be > 0"))]
    pub limit: u64,

    /// Period length in milliseconds
    #[validate(range(min = 1, message = "period_ms must be > 0"))]
    pub period_ms: u64,

    /// Simulated processing latency per chunk in milliseconds
    #[serde(default)]
    pub latency_ms: u64,

    /// Calls that fail with a processing error, by 0-based arrival order at
    /// the service (the chunk index whenever launches are paced)
    #[serde(default)]
    pub fail_chunks: Vec<usize>,

    /// Calls refused as over capacity, by 0-based arrival order
    #[serde(default)]
    pub refuse_chunks: Vec<usize>,
}

impl ServiceConfig {
    /// Rate contract described by this config
    pub fn rate_limits(&self) -> RateLimits {
        RateLimits::new(self.limit, Duration::from_millis(self.period_ms))
    }

    /// Simulated processing latency
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Dispatch mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One chunk at a time on the calling task
    #[default]
    Sequential,
    /// One task per chunk, launches paced
    Parallel,
}

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispatchSettings {
    /// Dispatch mode
    #[serde(default)]
    pub mode: DispatchMode,

    /// Upper bound on concurrently running chunk tasks (None = chunk count)
    #[serde(default)]
    #[validate(range(min = 1, message = "max_in_flight must be > 0"))]
    pub max_in_flight: Option<usize>,

    /// Capacity of the error and unsent-chunk report channels
    #[serde(default = "default_report_capacity")]
    #[validate(range(min = 1, message = "report_capacity must be > 0"))]
    pub report_capacity: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            max_in_flight: None,
            report_capacity: default_report_capacity(),
        }
    }
}

fn default_report_capacity() -> usize {
    16
}

/// Synthetic workload
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WorkloadConfig {
    /// Number of items in the batch
    #[serde(default = "default_items")]
    pub items: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            items: default_items(),
        }
    }
}

fn default_items() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let json = r#"{ "service": { "limit": 20, "period_ms": 1000 } }"#;
        let bp: RelayBlueprint = serde_json::from_str(json).unwrap();
        assert_eq!(bp.version, ConfigVersion::V1);
        assert_eq!(bp.dispatcher.mode, DispatchMode::Sequential);
        assert_eq!(bp.dispatcher.report_capacity, 16);
        assert_eq!(bp.workload.items, 100);
        assert_eq!(
            bp.service.rate_limits(),
            RateLimits::new(20, Duration::from_secs(1))
        );
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_chunk_layout() {
        let json = r#"{ "service": { "limit": 20, "period_ms": 1000 }, "workload": { "items": 1325 } }"#;
        let bp: RelayBlueprint = serde_json::from_str(json).unwrap();
        assert_eq!(bp.chunk_count(), 67);
        assert_eq!(bp.minimum_duration(), Duration::from_secs(66));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let json = r#"{ "service": { "limit": 0, "period_ms": 1000 } }"#;
        let bp: RelayBlueprint = serde_json::from_str(json).unwrap();
        assert!(bp.validate().is_err());
    }

    #[test]
    fn test_mode_snake_case() {
        let mode: DispatchMode = serde_json::from_str(r#""parallel""#).unwrap();
        assert_eq!(mode, DispatchMode::Parallel);
    }
}
