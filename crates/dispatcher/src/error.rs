//! Dispatcher error types

use contracts::ServiceError;
use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// No service was injected before dispatching
    #[error("no service configured, call set_service before dispatching")]
    ServiceNotSet,

    /// Service advertised a limit no chunk can satisfy
    #[error("service advertised invalid limit {limit}, limit must be positive")]
    InvalidLimits { limit: u64 },

    /// A chunk was rejected; `sent` counts only the chunks before it
    #[error("chunk {chunk_index} failed after {sent} items sent: {source}")]
    ChunkFailed {
        sent: usize,
        chunk_index: usize,
        #[source]
        source: ServiceError,
    },
}

impl DispatcherError {
    /// Items successfully submitted before the failure
    pub fn sent(&self) -> usize {
        match self {
            Self::ChunkFailed { sent, .. } => *sent,
            Self::ServiceNotSet | Self::InvalidLimits { .. } => 0,
        }
    }

    /// Underlying service error, if the failure came from the service
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::ChunkFailed { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the service refused the chunk for lack of capacity
    pub fn is_capacity_refusal(&self) -> bool {
        self.service_error()
            .is_some_and(ServiceError::is_capacity_refusal)
    }
}
