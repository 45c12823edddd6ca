//! Span handle and creation options

use mts_core::{CorrelationId, TraceContext};
use opentelemetry::trace::{SpanKind, Status, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use std::error::Error;

/// Attribute key carrying the span's correlation ID
pub const CORRELATION_ID_ATTRIBUTE: &str = "correlation.id";

/// Options for [`Tracer::create_span`](crate::Tracer::create_span)
#[derive(Debug, Clone, Default)]
pub struct SpanOptions {
    pub attributes: Vec<KeyValue>,

    /// Explicit parent; `None` parents on the active span, if any
    pub parent: Option<TraceContext>,

    /// Correlation ID to attach; generated when `None`
    pub correlation_id: Option<CorrelationId>,

    pub kind: Option<SpanKind>,
}

impl SpanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_parent(mut self, parent: TraceContext) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Correlation ID stored next to the span in its context
#[derive(Debug, Clone)]
pub(crate) struct SpanCorrelation(pub(crate) CorrelationId);

/// A started span.
///
/// Cloning is cheap and every clone refers to the same underlying span.
#[derive(Debug, Clone)]
pub struct Span {
    cx: Context,
}

impl Span {
    pub(crate) fn from_context(cx: Context) -> Self {
        Self { cx }
    }

    /// Context with this span as the active span
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Finish the span; later calls are ignored
    pub fn end(&self) {
        self.cx.span().end();
    }

    pub fn set_attribute(&self, attribute: KeyValue) {
        self.cx.span().set_attribute(attribute);
    }

    pub fn add_event(&self, name: impl Into<String>, attributes: Vec<KeyValue>) {
        self.cx.span().add_event(name.into(), attributes);
    }

    /// Record `error` as an exception event and mark the span failed
    pub fn record_error(&self, error: &dyn Error) {
        let span = self.cx.span();
        span.record_error(error);
        span.set_status(Status::error(error.to_string()));
    }

    pub fn is_recording(&self) -> bool {
        self.cx.span().is_recording()
    }

    /// Correlation ID attached at creation, if this span was made by a [`Tracer`](crate::Tracer)
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.cx.get::<SpanCorrelation>().map(|c| &c.0)
    }

    /// The span's position as a W3C trace context.
    ///
    /// `None` when the underlying tracer produced an invalid span context,
    /// as a no-op tracer does for root spans.
    pub fn trace_context(&self) -> Option<TraceContext> {
        let span = self.cx.span();
        let sc = span.span_context();
        if !sc.is_valid() {
            return None;
        }

        let state = sc.trace_state().header();
        Some(TraceContext {
            trace_id: sc.trace_id().to_string(),
            span_id: sc.span_id().to_string(),
            trace_flags: sc.trace_flags().to_u8(),
            tracestate: (!state.is_empty()).then_some(state),
        })
    }
}
