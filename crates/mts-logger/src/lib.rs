//! MTS Logger - structured, PII-safe logging for MTSynergy services
//!
//! The [`Logger`] writes one JSON object per line. Before an entry leaves the
//! process its message, context and stack trace are scrubbed with the active
//! pattern set, and `userId`/`workspaceId` are lifted out of the context into
//! first-class fields.
//!
//! - **Patterns**: a caller-supplied baseline, optionally upgraded by a
//!   bounded fetch from a pattern endpoint
//! - **Correlation**: a per-runtime [`CorrelationStore`] chosen at initialize
//! - **Sinks**: stdout by default, file or in-memory capture on request

pub mod config;
pub mod correlation_store;
pub mod entry;
pub mod error;
pub mod logger;
pub mod pattern_source;
pub mod sink;

pub use config::LoggerConfig;
pub use correlation_store::{
    CorrelationStore, GlobalStore, RuntimeEnvironment, SessionStore, TaskLocalStore,
};
pub use entry::{LogEntry, LogLevel};
pub use error::{LoggerError, LoggerResult};
pub use logger::Logger;
pub use pattern_source::PatternSource;
pub use sink::{FileSink, LogSink, MemorySink, StdoutSink};
