//! Relay orchestrator - wires the simulated service to a dispatcher and runs
//! one batch through it.

use std::sync::Arc;
use std::time::Duration;

use contracts::{DispatchMode, RelayBlueprint, ServiceConfig, ServiceError};
use dispatcher::{CancellationToken, Dispatcher, DispatcherConfig, DispatcherError, MockService};
use observability::RunningStats;
use tokio::time::Instant;
use tracing::{info, warn};

use super::RelayStats;
use crate::error::CliError;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Validated blueprint with CLI overrides applied
    pub blueprint: RelayBlueprint,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Build the simulated service described by the config
pub fn build_service(config: &ServiceConfig) -> MockService {
    let mut service = MockService::new(config.limit, Duration::from_millis(config.period_ms))
        .with_latency(config.latency());
    for &index in &config.fail_chunks {
        service = service.fail_chunk(
            index,
            ServiceError::processing(format!("scripted failure on chunk {index}")),
        );
    }
    for &index in &config.refuse_chunks {
        service = service.fail_chunk(index, ServiceError::Blocked);
    }
    service
}

/// Main relay orchestrator
pub struct Relay {
    config: RelayConfig,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Dispatch the configured workload to completion
    pub async fn run(self, ctx: CancellationToken) -> Result<RelayStats, CliError> {
        if let Some(port) = self.config.metrics_port {
            if let Err(e) = observability::init_metrics_only(port) {
                warn!(error = %e, port, "Metrics endpoint unavailable, continuing without it");
            }
        }

        let blueprint = &self.config.blueprint;
        let service = build_service(&blueprint.service);
        let mut dispatcher =
            Dispatcher::with_config(DispatcherConfig::from(&blueprint.dispatcher));
        dispatcher.set_service(service.clone());

        let items: Vec<u64> = (0..blueprint.workload.items as u64).collect();
        let mode = blueprint.dispatcher.mode;

        info!(
            mode = ?mode,
            items = items.len(),
            chunks = blueprint.chunk_count(),
            "Dispatching batch"
        );

        let started = Instant::now();
        let mut stats = RelayStats::new(mode, items.len());

        match mode {
            DispatchMode::Sequential => match dispatcher.send(&ctx, &items).await {
                Ok(sent) => stats.sent = sent,
                Err(e @ DispatcherError::ChunkFailed { .. }) => {
                    stats.sent = e.sent();
                    stats.failures.push(e.to_string());
                }
                Err(e) => return Err(e.into()),
            },
            DispatchMode::Parallel => {
                let unsent = dispatcher
                    .parallel_send_collect(&ctx, Arc::<[u64]>::from(items))
                    .await?;
                stats.unsent_items = unsent.iter().map(|u| u.chunk.len()).sum();
                // Panicked chunks are in neither list, so count acceptances directly
                stats.sent = dispatcher.metrics_snapshot().items_sent as usize;
                stats.failures = unsent
                    .iter()
                    .map(|u| format!("items {:?}: {}", u.chunk.range(), u.error))
                    .collect();
            }
        }

        stats.duration = started.elapsed();
        stats.dispatch = dispatcher.metrics_snapshot();
        stats.submission_gaps_ms = submission_gaps(&service).summary();

        Ok(stats)
    }
}

/// Time between consecutive chunk arrivals at the service, in milliseconds
fn submission_gaps(service: &MockService) -> RunningStats {
    let mut starts = service.start_times();
    starts.sort();

    let mut gaps = RunningStats::default();
    for pair in starts.windows(2) {
        gaps.push((pair[1] - pair[0]).as_secs_f64() * 1000.0);
    }
    gaps
}
