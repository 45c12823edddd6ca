//! Error types for mts-logger

use mts_core::PatternSetError;
use std::time::Duration;
use thiserror::Error;

/// Errors from the logger's awaitable helpers.
///
/// Logging calls themselves never fail; these only surface from
/// [`Logger::refresh_patterns`](crate::Logger::refresh_patterns) and the
/// pattern source.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Pattern endpoint answered with a non-success status
    #[error("Pattern endpoint returned HTTP {status}")]
    Http { status: u16 },

    /// Body was not a JSON array of patterns
    #[error("Pattern payload has the wrong shape: {0}")]
    Shape(#[from] serde_json::Error),

    #[error("Pattern fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    #[error("Pattern endpoint returned no patterns")]
    EmptyPatternSet,

    /// A fetched pattern failed validation
    #[error(transparent)]
    Patterns(#[from] PatternSetError),

    #[error("No pattern URL configured")]
    NoPatternSource,

    #[error("Logger is not initialized")]
    NotInitialized,
}

/// Result type for logger operations
pub type LoggerResult<T> = Result<T, LoggerError>;

impl LoggerError {
    /// Whether the failure came from the network rather than the payload
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LoggerError::Network(_) | LoggerError::Http { .. } | LoggerError::FetchTimeout(_)
        )
    }
}
