//! MTS Trace - span creation over OpenTelemetry
//!
//! [`Tracer`] is a thin lifecycle wrapper around an OpenTelemetry tracer:
//! it refuses to create spans before `initialize`, refuses to be re-initialized
//! under a different service name, stamps every span with a `correlation.id`
//! attribute and parents spans either on an explicit W3C [`TraceContext`] or on
//! whatever span is active in the ambient context.
//!
//! [`TraceContext`]: mts_core::TraceContext

pub mod error;
pub mod span;
pub mod tracer;

pub use error::{TraceError, TraceResult};
pub use span::{Span, SpanOptions, CORRELATION_ID_ATTRIBUTE};
pub use tracer::Tracer;
