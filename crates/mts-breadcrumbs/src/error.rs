//! Error types for mts-breadcrumbs

use thiserror::Error;

/// Persistence errors.
///
/// `add` and `clear` never return these; they are logged from the background
/// write. Only awaited calls such as `flush` hand them back.
#[derive(Debug, Error)]
pub enum BreadcrumbError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Provider-specific failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for breadcrumb persistence
pub type BreadcrumbResult<T> = Result<T, BreadcrumbError>;

impl BreadcrumbError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}
