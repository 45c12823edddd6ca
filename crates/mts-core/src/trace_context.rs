//! W3C Trace Context propagation
//!
//! Parses and writes the `traceparent` / `tracestate` header pair:
//!
//! ```text
//! traceparent: 00-<32 lowercase hex trace-id>-<16 lowercase hex span-id>-<2 lowercase hex flags>
//! ```
//!
//! [`extract`] reads untrusted input and returns `None` on any deviation.
//! [`inject`] writes values we authored ourselves and returns an error instead,
//! since a malformed outgoing header would silently break the trace downstream.

use http::header::{HeaderMap, HeaderName, HeaderValue};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header carrying version, trace id, parent span id and flags
pub const TRACEPARENT_HEADER: &str = "traceparent";

/// Header carrying opaque vendor state
pub const TRACESTATE_HEADER: &str = "tracestate";

/// The only traceparent version this codec speaks
pub const SUPPORTED_VERSION: &str = "00";

/// Sampled bit of the trace flags byte
pub const FLAG_SAMPLED: u8 = 0x01;

const TRACE_ID_LEN: usize = 32;
const SPAN_ID_LEN: usize = 16;
const FLAGS_LEN: usize = 2;

/// Reasons an outgoing trace context is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceContextError {
    #[error("trace id must be 32 lowercase hex characters, got {0:?}")]
    InvalidTraceId(String),

    #[error("trace id must not be all zeros")]
    ZeroTraceId,

    #[error("span id must be 16 lowercase hex characters, got {0:?}")]
    InvalidSpanId(String),

    #[error("span id must not be all zeros")]
    ZeroSpanId,

    #[error("tracestate is not a valid header value: {0:?}")]
    InvalidTracestate(String),
}

/// Position within a distributed trace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceContext {
    /// 32 lowercase hex characters, never all zero
    pub trace_id: String,

    /// 16 lowercase hex characters, never all zero
    pub span_id: String,

    /// Trace flags byte (bit 0 = sampled)
    pub trace_flags: u8,

    /// Opaque vendor state, passed through verbatim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracestate: Option<String>,
}

impl TraceContext {
    /// Build a validated trace context
    pub fn new(
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        trace_flags: u8,
    ) -> Result<Self, TraceContextError> {
        let context = Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            trace_flags,
            tracestate: None,
        };
        context.validate()?;
        Ok(context)
    }

    /// Start a new root trace with fresh random ids
    pub fn generate(sampled: bool) -> Self {
        Self {
            trace_id: generate_trace_id(),
            span_id: generate_span_id(),
            trace_flags: if sampled { FLAG_SAMPLED } else { 0 },
            tracestate: None,
        }
    }

    /// Same trace, same flags and state, new span id
    pub fn child(&self) -> Self {
        Self {
            span_id: generate_span_id(),
            ..self.clone()
        }
    }

    /// Attach vendor state
    pub fn with_tracestate(mut self, tracestate: impl Into<String>) -> Self {
        self.tracestate = Some(tracestate.into());
        self
    }

    /// Whether the sampled flag is set
    pub fn is_sampled(&self) -> bool {
        self.trace_flags & FLAG_SAMPLED == FLAG_SAMPLED
    }

    /// Check the id invariants
    pub fn validate(&self) -> Result<(), TraceContextError> {
        if !is_lower_hex(&self.trace_id, TRACE_ID_LEN) {
            return Err(TraceContextError::InvalidTraceId(self.trace_id.clone()));
        }
        if is_all_zero(&self.trace_id) {
            return Err(TraceContextError::ZeroTraceId);
        }
        if !is_lower_hex(&self.span_id, SPAN_ID_LEN) {
            return Err(TraceContextError::InvalidSpanId(self.span_id.clone()));
        }
        if is_all_zero(&self.span_id) {
            return Err(TraceContextError::ZeroSpanId);
        }
        Ok(())
    }

    /// Render the `traceparent` header value
    pub fn to_traceparent(&self) -> String {
        format!(
            "{}-{}-{}-{:02x}",
            SUPPORTED_VERSION, self.trace_id, self.span_id, self.trace_flags
        )
    }
}

/// Parse a bare `traceparent` value. `tracestate` is left empty.
pub fn parse_traceparent(value: &str) -> Option<TraceContext> {
    let fields: Vec<&str> = value.split('-').collect();
    let [version, trace_id, span_id, flags] = fields.as_slice() else {
        return None;
    };

    // Anything but 00 is rejected, including the reserved ff
    if *version != SUPPORTED_VERSION {
        return None;
    }
    if !is_lower_hex(trace_id, TRACE_ID_LEN) || is_all_zero(trace_id) {
        return None;
    }
    if !is_lower_hex(span_id, SPAN_ID_LEN) || is_all_zero(span_id) {
        return None;
    }
    if !is_lower_hex(flags, FLAGS_LEN) {
        return None;
    }
    let trace_flags = u8::from_str_radix(flags, 16).ok()?;

    Some(TraceContext {
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        trace_flags,
        tracestate: None,
    })
}

/// Read a trace context from incoming headers.
///
/// Header names are matched case-insensitively. Returns `None` when the
/// `traceparent` header is missing, repeated or malformed. Multiple
/// `tracestate` headers are joined with commas.
pub fn extract(headers: &HeaderMap) -> Option<TraceContext> {
    let mut values = headers.get_all(TRACEPARENT_HEADER).iter();
    let traceparent = values.next()?;
    if values.next().is_some() {
        return None;
    }

    let mut context = parse_traceparent(traceparent.to_str().ok()?)?;

    let states: Vec<&str> = headers
        .get_all(TRACESTATE_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .collect();
    if !states.is_empty() {
        context.tracestate = Some(states.join(","));
    }

    Some(context)
}

/// Write `context` into outgoing headers, replacing any existing trace headers.
///
/// # Errors
///
/// Returns an error when the context breaks the id invariants or its
/// `tracestate` cannot be represented as a header value. Headers are left
/// untouched in that case.
pub fn inject(context: &TraceContext, headers: &mut HeaderMap) -> Result<(), TraceContextError> {
    context.validate()?;

    let traceparent = HeaderValue::from_str(&context.to_traceparent())
        .map_err(|_| TraceContextError::InvalidTraceId(context.trace_id.clone()))?;
    let tracestate = context
        .tracestate
        .as_deref()
        .map(|state| {
            HeaderValue::from_str(state)
                .map_err(|_| TraceContextError::InvalidTracestate(state.to_string()))
        })
        .transpose()?;

    headers.insert(HeaderName::from_static(TRACEPARENT_HEADER), traceparent);
    match tracestate {
        Some(value) => {
            headers.insert(HeaderName::from_static(TRACESTATE_HEADER), value);
        }
        None => {
            headers.remove(TRACESTATE_HEADER);
        }
    }
    Ok(())
}

/// Random 32-char lowercase hex trace id, never all zero
pub fn generate_trace_id() -> String {
    random_nonzero_hex::<16>()
}

/// Random 16-char lowercase hex span id, never all zero
pub fn generate_span_id() -> String {
    random_nonzero_hex::<8>()
}

fn random_nonzero_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    loop {
        OsRng.fill_bytes(&mut bytes);
        if bytes.iter().any(|b| *b != 0) {
            return hex::encode(bytes);
        }
    }
}

fn is_lower_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn is_all_zero(value: &str) -> bool {
    value.bytes().all(|b| b == b'0')
}
