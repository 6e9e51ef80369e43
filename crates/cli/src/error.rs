//! Error types for CLI operations.

use dispatcher::DispatcherError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Dispatcher could not start
    #[error("Dispatch setup failed: {0}")]
    Dispatch(#[from] DispatcherError),

    /// Run exceeded its timeout
    #[error("Relay timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}
