//! Breadcrumb event types

use chrono::{DateTime, Utc};
use mts_core::{CorrelationId, PiiScrubber};
use serde::{Deserialize, Serialize};

/// One recorded interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreadcrumbEvent {
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,

    #[serde(flatten)]
    pub kind: BreadcrumbKind,
}

/// What happened, tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BreadcrumbKind {
    Click {
        /// Selector or identifier of the clicked element
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Navigation {
        from: String,
        to: String,
    },
    #[serde(rename_all = "camelCase")]
    FormSubmit {
        form: String,
        field_count: u32,
    },
    #[serde(rename_all = "camelCase")]
    Network {
        method: String,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
}

impl BreadcrumbEvent {
    /// Event stamped with the current time
    pub fn new(kind: BreadcrumbKind) -> Self {
        Self {
            timestamp: Utc::now(),
            correlation_id: None,
            kind,
        }
    }

    pub fn click(target: impl Into<String>, text: Option<String>) -> Self {
        Self::new(BreadcrumbKind::Click {
            target: target.into(),
            text,
        })
    }

    pub fn navigation(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(BreadcrumbKind::Navigation {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn form_submit(form: impl Into<String>, field_count: u32) -> Self {
        Self::new(BreadcrumbKind::FormSubmit {
            form: form.into(),
            field_count,
        })
    }

    pub fn network(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(BreadcrumbKind::Network {
            method: method.into(),
            url: url.into(),
            status: None,
            duration_ms: None,
        })
    }

    /// Fill in the response of a network breadcrumb; other kinds are unchanged
    pub fn with_response(mut self, status: u16, duration_ms: u64) -> Self {
        if let BreadcrumbKind::Network {
            status: s,
            duration_ms: d,
            ..
        } = &mut self.kind
        {
            *s = Some(status);
            *d = Some(duration_ms);
        }
        self
    }

    pub fn with_correlation_id(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Copy with every free-text field run through `scrubber`
    pub fn redacted(&self, scrubber: &PiiScrubber) -> Self {
        let scrub = |s: &str| scrubber.apply_patterns(s);
        let kind = match &self.kind {
            BreadcrumbKind::Click { target, text } => BreadcrumbKind::Click {
                target: scrub(target),
                text: text.as_deref().map(scrub),
            },
            BreadcrumbKind::Navigation { from, to } => BreadcrumbKind::Navigation {
                from: scrub(from),
                to: scrub(to),
            },
            BreadcrumbKind::FormSubmit { form, field_count } => BreadcrumbKind::FormSubmit {
                form: scrub(form),
                field_count: *field_count,
            },
            BreadcrumbKind::Network {
                method,
                url,
                status,
                duration_ms,
            } => BreadcrumbKind::Network {
                method: method.clone(),
                url: scrub(url),
                status: *status,
                duration_ms: *duration_ms,
            },
        };
        Self {
            timestamp: self.timestamp,
            correlation_id: self.correlation_id.clone(),
            kind,
        }
    }

    /// Serialized size in bytes
    pub fn size_bytes(&self) -> serde_json::Result<usize> {
        serde_json::to_vec(self).map(|bytes| bytes.len())
    }
}
