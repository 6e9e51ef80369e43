//! RateLimitedService trait - Dispatcher downstream interface
//!
//! Defines the collaborator a dispatcher forwards chunks to.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ServiceError;

/// Throughput contract advertised by a service
///
/// The service accepts at most `limit` items per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    /// Maximum items per period
    pub limit: u64,
    /// Window the limit applies to
    pub period: Duration,
}

impl RateLimits {
    pub fn new(limit: u64, period: Duration) -> Self {
        Self { limit, period }
    }

    /// Largest chunk the service accepts, `None` when the limit is zero
    pub fn chunk_size(&self) -> Option<usize> {
        if self.limit == 0 {
            None
        } else {
            Some(usize::try_from(self.limit).unwrap_or(usize::MAX))
        }
    }
}

/// Rate-limited downstream service
///
/// All collaborators a dispatcher drives must implement this trait.
#[trait_variant::make(RateLimitedService: Send)]
pub trait LocalRateLimitedService<T> {
    /// Current rate contract, queried once per dispatch call
    fn limits(&self) -> RateLimits;

    /// Process one chunk
    ///
    /// The token is passed through untouched; honouring it is up to the
    /// service.
    ///
    /// # Errors
    /// [`ServiceError::Blocked`] when over capacity, any other variant for
    /// generic failures
    async fn process(&self, ctx: &CancellationToken, chunk: &[T]) -> Result<(), ServiceError>;
}
