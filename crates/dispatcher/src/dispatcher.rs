//! Dispatcher - chunked, rate-paced forwarding of a batch to a service

use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use contracts::{CancellationToken, DispatchSettings, RateLimitedService, RateLimits};
use observability::metrics::{record_chunk_outcome, record_dispatch_completed, record_pacing_sleep};

use crate::error::DispatcherError;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::pacer::{self, Pacer};

const MODE: &str = "sequential";

/// Dispatcher configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Cap on concurrently running chunk tasks (None = one slot per chunk)
    pub max_in_flight: Option<usize>,
    /// Capacity of the report channels created by `parallel_send_collect`
    pub report_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: None,
            report_capacity: 16,
        }
    }
}

impl From<&DispatchSettings> for DispatcherConfig {
    fn from(settings: &DispatchSettings) -> Self {
        Self {
            max_in_flight: settings.max_in_flight,
            report_capacity: settings.report_capacity,
        }
    }
}

/// Forwards batches to a rate-limited service
///
/// Constructed unconfigured; inject the service with [`Dispatcher::set_service`]
/// before dispatching.
pub struct Dispatcher<S> {
    pub(crate) service: Option<Arc<S>>,
    pub(crate) config: DispatcherConfig,
    pub(crate) metrics: Arc<DispatchMetrics>,
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Dispatcher<S> {
    /// Create a dispatcher with no service and default config
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            service: None,
            config,
            metrics: Arc::new(DispatchMetrics::new()),
        }
    }

    /// Builder-style service injection
    pub fn with_service(mut self, service: S) -> Self {
        self.set_service(service);
        self
    }

    /// Inject the downstream service
    ///
    /// Takes `&mut self`, so it cannot overlap an in-flight dispatch.
    pub fn set_service(&mut self, service: S) {
        self.set_shared_service(Arc::new(service));
    }

    /// Inject a service that is already shared elsewhere
    pub fn set_shared_service(&mut self, service: Arc<S>) {
        self.service = Some(service);
    }

    pub fn service(&self) -> Option<&Arc<S>> {
        self.service.as_ref()
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Shared metrics, updated by every dispatch call
    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Send a batch one chunk at a time on the calling task
    ///
    /// Chunks hold at most `limit` items and start at least one `period`
    /// apart, unless processing a chunk already took longer than that.
    /// Stops at the first rejected chunk; nothing is retried.
    ///
    /// Returns the number of items sent. An empty batch returns `Ok(0)`
    /// without touching the service.
    ///
    /// # Errors
    /// - [`DispatcherError::ServiceNotSet`] if no service was injected
    /// - [`DispatcherError::InvalidLimits`] if the service limit is zero
    /// - [`DispatcherError::ChunkFailed`] on the first rejected chunk; its
    ///   `sent` excludes the rejected chunk
    #[instrument(name = "dispatcher_send", skip(self, ctx, batch), fields(items = batch.len()))]
    pub async fn send<T>(
        &self,
        ctx: &CancellationToken,
        batch: &[T],
    ) -> Result<usize, DispatcherError>
    where
        S: RateLimitedService<T>,
    {
        if batch.is_empty() {
            return Ok(0);
        }

        let service = self.service.as_deref().ok_or(DispatcherError::ServiceNotSet)?;
        let (limits, chunk_size) = resolve_limits(service.limits())?;
        let chunk_count = pacer::chunk_count(batch.len(), chunk_size);

        debug!(
            limit = limits.limit,
            period_ms = limits.period.as_millis() as u64,
            chunks = chunk_count,
            "Sequential dispatch started"
        );

        let started = Instant::now();
        let mut pacer = Pacer::new(limits.period);
        let mut sent = 0;

        for (chunk_index, range) in pacer::chunk_ranges(batch.len(), chunk_size).enumerate() {
            pacer.start_window();
            let chunk = &batch[range];

            if let Err(source) = service.process(ctx, chunk).await {
                let refused = source.is_capacity_refusal();
                self.metrics.record_failure(refused);
                record_chunk_outcome(MODE, chunk.len(), false, refused);
                warn!(chunk_index, sent, error = %source, "Chunk rejected, stopping");
                record_dispatch_completed(MODE, chunk_index + 1, started.elapsed());
                return Err(DispatcherError::ChunkFailed {
                    sent,
                    chunk_index,
                    source,
                });
            }

            sent += chunk.len();
            self.metrics.record_success(chunk.len());
            record_chunk_outcome(MODE, chunk.len(), true, false);
            debug!(chunk_index, size = chunk.len(), sent, "Chunk accepted");

            if sent < batch.len() {
                if let Some(slept) = pacer.pace().await {
                    self.metrics.record_pacing(slept);
                    record_pacing_sleep(MODE, slept);
                }
            }
        }

        let elapsed = started.elapsed();
        record_dispatch_completed(MODE, chunk_count, elapsed);
        info!(
            sent,
            chunks = chunk_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch sent"
        );

        Ok(sent)
    }
}

/// Validate the advertised limits and derive the chunk size
pub(crate) fn resolve_limits(
    limits: RateLimits,
) -> Result<(RateLimits, NonZeroUsize), DispatcherError> {
    limits
        .chunk_size()
        .and_then(NonZeroUsize::new)
        .map(|size| (limits, size))
        .ok_or(DispatcherError::InvalidLimits {
            limit: limits.limit,
        })
}
