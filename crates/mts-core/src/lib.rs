//! MTS Core - identifiers, wire formats and PII redaction for MTSynergy telemetry
//!
//! This crate provides the leaf building blocks the telemetry facades sit on:
//!
//! - **Correlation**: UUIDv4 correlation IDs that can only be generated or parsed
//! - **Trace context**: W3C `traceparent` / `tracestate` extraction and injection
//! - **PII**: pattern validation, compiled pattern sets and the recursive scrubber
//! - **Config**: TOML configuration with environment overrides

pub mod config;
pub mod correlation;
pub mod error;
pub mod pii;
pub mod trace_context;

// Re-export commonly used types
pub use config::{ConfigLoader, StorageBackend, TelemetryConfig};
pub use correlation::CorrelationId;
pub use error::{CoreError, CoreResult};
pub use pii::{
    apply_patterns, builtin_patterns, scrub, CompiledPattern, DepthPolicy, Node, Opaque,
    PatternError, PatternSet, PatternSetError, PiiPattern, PiiScrubber, ScrubOptions, Value,
};
pub use trace_context::{TraceContext, TraceContextError};

/// Default service name used when nothing else is configured
pub const DEFAULT_SERVICE_NAME: &str = "mtsynergy";
