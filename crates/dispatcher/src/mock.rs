//! Mock rate-limited service
//!
//! In-memory service for tests and the CLI simulator. Capacity drops by the
//! chunk size on every accepted chunk and comes back one period later, so a
//! caller that outpaces the contract eventually sees [`ServiceError::Blocked`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{instrument, trace};

use contracts::{CancellationToken, RateLimitedService, RateLimits, ServiceError};

/// One recorded `process` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCall {
    /// 0-based arrival order
    pub index: usize,
    /// Items in the chunk
    pub items: usize,
    /// When the call arrived
    pub started_at: Instant,
    /// Whether the chunk was accepted
    pub accepted: bool,
}

#[derive(Debug)]
struct Inner {
    limits: RateLimits,
    latency: Duration,
    /// Scripted failures keyed by arrival order, not by chunk position
    failures: HashMap<usize, ServiceError>,
    available: AtomicI64,
    received: AtomicUsize,
    next_index: AtomicUsize,
    calls: Mutex<Vec<ProcessCall>>,
}

/// Mock service; clones share state
#[derive(Debug, Clone)]
pub struct MockService {
    inner: Arc<Inner>,
}

impl MockService {
    /// Service accepting `limit` items per `period`
    pub fn new(limit: u64, period: Duration) -> Self {
        Self::from_parts(RateLimits::new(limit, period), Duration::ZERO, HashMap::new())
    }

    /// Add artificial processing latency
    ///
    /// # Panics
    /// If the service has already been cloned.
    pub fn with_latency(self, latency: Duration) -> Self {
        let inner = self.into_inner();
        Self::from_parts(inner.limits, latency, inner.failures)
    }

    /// Fail the `index`-th call to arrive (0-based)
    ///
    /// Arrival order is the chunk order for sequential dispatch and for paced
    /// parallel launches. With a near-zero period, parallel launches may reach
    /// the service out of order and the failure lands on whichever arrives
    /// `index`-th.
    ///
    /// # Panics
    /// If the service has already been cloned.
    pub fn fail_chunk(self, index: usize, error: ServiceError) -> Self {
        let inner = self.into_inner();
        let mut failures = inner.failures;
        failures.insert(index, error);
        Self::from_parts(inner.limits, inner.latency, failures)
    }

    /// Total items accepted
    pub fn received(&self) -> usize {
        self.inner.received.load(Ordering::SeqCst)
    }

    /// Capacity currently left in the window (may be negative)
    pub fn available(&self) -> i64 {
        self.inner.available.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// All calls in arrival order
    pub fn calls(&self) -> Vec<ProcessCall> {
        self.lock_calls().clone()
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.lock_calls().iter().map(|c| c.items).collect()
    }

    pub fn start_times(&self) -> Vec<Instant> {
        self.lock_calls().iter().map(|c| c.started_at).collect()
    }

    fn from_parts(
        limits: RateLimits,
        latency: Duration,
        failures: HashMap<usize, ServiceError>,
    ) -> Self {
        let available = i64::try_from(limits.limit).unwrap_or(i64::MAX);
        Self {
            inner: Arc::new(Inner {
                limits,
                latency,
                failures,
                available: AtomicI64::new(available),
                received: AtomicUsize::new(0),
                next_index: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Take the configuration out of a not-yet-shared service
    fn into_inner(self) -> Inner {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => inner,
            Err(_) => panic!("MockService builders must run before the service is cloned"),
        }
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<ProcessCall>> {
        self.inner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, index: usize, items: usize, started_at: Instant, accepted: bool) {
        self.lock_calls().push(ProcessCall {
            index,
            items,
            started_at,
            accepted,
        });
    }

    /// Decide the outcome of call `index` for a chunk of `items`
    fn admit(&self, index: usize, items: usize) -> Result<(), ServiceError> {
        if let Some(error) = self.inner.failures.get(&index) {
            return Err(error.clone());
        }
        if self.available() < 0 {
            return Err(ServiceError::Blocked);
        }

        let count = i64::try_from(items).unwrap_or(i64::MAX);
        self.inner.available.fetch_sub(count, Ordering::SeqCst);
        self.inner.received.fetch_add(items, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.limits.period).await;
            inner.available.fetch_add(count, Ordering::SeqCst);
        });
        Ok(())
    }
}

impl<T: Sync> RateLimitedService<T> for MockService {
    fn limits(&self) -> RateLimits {
        self.inner.limits
    }

    #[instrument(name = "mock_service_process", skip(self, ctx, chunk), fields(items = chunk.len()))]
    async fn process(&self, ctx: &CancellationToken, chunk: &[T]) -> Result<(), ServiceError> {
        let started_at = Instant::now();
        let index = self.inner.next_index.fetch_add(1, Ordering::SeqCst);

        if !self.inner.latency.is_zero() {
            tokio::select! {
                _ = ctx.cancelled() => {
                    self.record(index, chunk.len(), started_at, false);
                    return Err(ServiceError::Cancelled);
                }
                _ = tokio::time::sleep(self.inner.latency) => {}
            }
        }

        let outcome = self.admit(index, chunk.len());
        self.record(index, chunk.len(), started_at, outcome.is_ok());
        trace!(index, accepted = outcome.is_ok(), "Mock service processed chunk");
        outcome
    }
}
