//! Error types for mts-trace

use mts_core::TraceContextError;
use thiserror::Error;

/// Tracer lifecycle and propagation errors.
///
/// These are programming errors: fix the call site rather than retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    /// A span was requested before `initialize`
    #[error("Tracer is not initialized; call initialize(service_name) first")]
    NotInitialized,

    /// `initialize` was called again with a different service name
    #[error("Tracer already initialized as {current:?}, refusing {requested:?}")]
    ServiceNameConflict { current: String, requested: String },

    #[error("Service name cannot be empty")]
    EmptyServiceName,

    /// Parent context or outgoing headers failed validation
    #[error("Invalid trace context: {0}")]
    TraceContext(#[from] TraceContextError),
}

/// Result type for tracer operations
pub type TraceResult<T> = Result<T, TraceError>;
