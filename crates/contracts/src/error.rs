//! Layered error definitions
//!
//! Categorized by source: config / service / general

use thiserror::Error;

/// Unified error type for configuration and general failures
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors a rate-limited service may return from `process`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// Service is over capacity for the submitted chunk
    #[error("service is over capacity")]
    Blocked,

    /// Service rejected or failed to process the chunk
    #[error("processing failed: {message}")]
    Processing { message: String },

    /// Service could not be reached
    #[error("service unavailable: {message}")]
    Unavailable { message: String },

    /// Processing was abandoned because the caller cancelled
    #[error("processing cancelled")]
    Cancelled,
}

impl ServiceError {
    /// Create processing error
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing {
            message: message.into(),
        }
    }

    /// Create unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Whether this is the capacity-refusal signal
    pub fn is_capacity_refusal(&self) -> bool {
        matches!(self, Self::Blocked)
    }
}
