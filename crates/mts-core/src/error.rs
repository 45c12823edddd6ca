//! Error types for mts-core

use crate::config::ConfigError;
use crate::pii::{PatternError, PatternSetError};
use crate::trace_context::TraceContextError;
use thiserror::Error;

/// Errors surfaced by the core building blocks
#[derive(Debug, Error)]
pub enum CoreError {
    /// A string that is not a canonical UUIDv4 was offered as a correlation ID
    #[error("Invalid correlation ID: {0:?}")]
    InvalidCorrelationId(String),

    /// A single PII pattern failed validation
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A pattern list failed validation
    #[error(transparent)]
    PatternSet(#[from] PatternSetError),

    /// Trace context could not be built or injected
    #[error(transparent)]
    TraceContext(#[from] TraceContextError),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_error_is_transparent() {
        let err: CoreError = PatternError::MissingField("name").into();
        assert_eq!(err.to_string(), PatternError::MissingField("name").to_string());
    }

    #[test]
    fn test_invalid_correlation_id_message() {
        let err = CoreError::InvalidCorrelationId("nope".to_string());
        assert!(err.to_string().contains("\"nope\""));
    }
}
