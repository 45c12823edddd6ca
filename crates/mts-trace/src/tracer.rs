//! Tracer lifecycle and span creation

use crate::error::{TraceError, TraceResult};
use crate::span::{Span, SpanCorrelation, SpanOptions, CORRELATION_ID_ATTRIBUTE};
use http::HeaderMap;
use mts_core::trace_context::{self, TraceContext};
use mts_core::CorrelationId;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{
    FutureExt, SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    Tracer as _, TracerProvider, WithContext,
};
use opentelemetry::{Context, KeyValue};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

type TracerFactory = Arc<dyn Fn(String) -> BoxedTracer + Send + Sync>;

static GLOBAL: LazyLock<Tracer> = LazyLock::new(Tracer::from_global_provider);

enum TracerState {
    Uninitialized,
    Initialized {
        service_name: String,
        tracer: Arc<BoxedTracer>,
    },
}

/// Span factory bound to one service name
pub struct Tracer {
    factory: TracerFactory,
    state: RwLock<TracerState>,
}

impl Tracer {
    /// Process-wide tracer backed by the global OpenTelemetry provider
    pub fn global() -> &'static Tracer {
        &GLOBAL
    }

    /// Tracer that resolves against the global OpenTelemetry provider at initialize time
    pub fn from_global_provider() -> Self {
        Self::with_factory(Arc::new(|name: String| global::tracer(name)))
    }

    /// Tracer backed by a specific provider
    pub fn with_provider<P>(provider: P) -> Self
    where
        P: TracerProvider + Send + Sync + 'static,
        P::Tracer: Send + Sync + 'static,
        <P::Tracer as opentelemetry::trace::Tracer>::Span: Send + Sync + 'static,
    {
        Self::with_factory(Arc::new(move |name: String| {
            BoxedTracer::new(Box::new(provider.tracer(name)))
        }))
    }

    fn with_factory(factory: TracerFactory) -> Self {
        Self {
            factory,
            state: RwLock::new(TracerState::Uninitialized),
        }
    }

    /// Bind the tracer to `service_name`.
    ///
    /// Calling again with the same name is a no-op; a different name is refused.
    pub fn initialize(&self, service_name: &str) -> TraceResult<()> {
        if service_name.trim().is_empty() {
            return Err(TraceError::EmptyServiceName);
        }

        let mut state = self.state.write();
        match &*state {
            TracerState::Initialized {
                service_name: current,
                ..
            } => {
                if current == service_name {
                    debug!("Tracer already initialized for {}", current);
                    Ok(())
                } else {
                    Err(TraceError::ServiceNameConflict {
                        current: current.clone(),
                        requested: service_name.to_string(),
                    })
                }
            }
            TracerState::Uninitialized => {
                let tracer = (self.factory)(service_name.to_string());
                *state = TracerState::Initialized {
                    service_name: service_name.to_string(),
                    tracer: Arc::new(tracer),
                };
                info!("Tracer initialized for service {}", service_name);
                Ok(())
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.state.read(), TracerState::Initialized { .. })
    }

    pub fn service_name(&self) -> Option<String> {
        match &*self.state.read() {
            TracerState::Initialized { service_name, .. } => Some(service_name.clone()),
            TracerState::Uninitialized => None,
        }
    }

    /// Drop the service binding so the tracer can be initialized again
    pub fn reset(&self) {
        *self.state.write() = TracerState::Uninitialized;
    }

    /// Start a span.
    ///
    /// With `options.parent` the span continues that remote trace; otherwise it
    /// becomes a child of the active span, or a root when nothing is active.
    pub fn create_span(&self, name: &str, options: SpanOptions) -> TraceResult<Span> {
        let tracer = match &*self.state.read() {
            TracerState::Initialized { tracer, .. } => Arc::clone(tracer),
            TracerState::Uninitialized => return Err(TraceError::NotInitialized),
        };

        let parent_cx = match &options.parent {
            Some(parent) => remote_parent(parent)?,
            None => Context::current(),
        };

        let correlation_id = options
            .correlation_id
            .unwrap_or_else(CorrelationId::generate);

        let mut attributes = options.attributes;
        attributes.push(KeyValue::new(
            CORRELATION_ID_ATTRIBUTE,
            correlation_id.to_string(),
        ));

        let mut builder = tracer
            .span_builder(name.to_string())
            .with_attributes(attributes);
        if let Some(kind) = options.kind {
            builder = builder.with_kind(kind);
        }

        let span = builder.start_with_context(&*tracer, &parent_cx);
        let cx = parent_cx
            .with_span(span)
            .with_value(SpanCorrelation(correlation_id));

        Ok(Span::from_context(cx))
    }

    /// The span active in the current context, if any
    pub fn get_active_span(&self) -> Option<Span> {
        let cx = Context::current();
        cx.has_active_span().then(|| Span::from_context(cx))
    }

    /// Run `f` with `span` active; the previous context is restored when `f`
    /// returns or unwinds.
    pub fn with_span<T>(&self, span: &Span, f: impl FnOnce() -> T) -> T {
        let _guard = span.context().clone().attach();
        f()
    }

    /// Future that runs with `span` active on every poll
    pub fn with_span_async<F: Future>(
        &self,
        span: &Span,
        fut: F,
    ) -> WithContext<F> {
        fut.with_context(span.context().clone())
    }

    /// Create a span, run `f` with it active, then end it
    pub fn in_span<T>(
        &self,
        name: &str,
        options: SpanOptions,
        f: impl FnOnce(&Span) -> T,
    ) -> TraceResult<T> {
        let span = self.create_span(name, options)?;
        let result = self.with_span(&span, || f(&span));
        span.end();
        Ok(result)
    }

    /// Write the active span's `traceparent`/`tracestate` into `headers`.
    ///
    /// Returns `false` when there is no active span with a valid context.
    pub fn inject_active(&self, headers: &mut HeaderMap) -> TraceResult<bool> {
        let Some(context) = self.get_active_span().and_then(|s| s.trace_context()) else {
            return Ok(false);
        };
        trace_context::inject(&context, headers)?;
        Ok(true)
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("service_name", &self.service_name())
            .finish_non_exhaustive()
    }
}

/// Context carrying `parent` as a remote span context
fn remote_parent(parent: &TraceContext) -> TraceResult<Context> {
    parent.validate()?;

    // validate() guarantees lowercase hex of the right length
    let trace_id = TraceId::from_hex(&parent.trace_id)
        .map_err(|_| mts_core::TraceContextError::InvalidTraceId(parent.trace_id.clone()))?;
    let span_id = SpanId::from_hex(&parent.span_id)
        .map_err(|_| mts_core::TraceContextError::InvalidSpanId(parent.span_id.clone()))?;

    let trace_state = match parent.tracestate.as_deref() {
        Some(raw) => raw.parse::<TraceState>().unwrap_or_else(|e| {
            warn!("Dropping tracestate rejected by OpenTelemetry: {}", e);
            TraceState::default()
        }),
        None => TraceState::default(),
    };

    let span_context = SpanContext::new(
        trace_id,
        span_id,
        TraceFlags::new(parent.trace_flags),
        true,
        trace_state,
    );
    Ok(Context::current().with_remote_span_context(span_context))
}
