//! Correlation identifiers
//!
//! A correlation ID is a version-4 UUID in canonical hyphenated form. Values of
//! [`CorrelationId`] only come out of [`CorrelationId::generate`] or a successful
//! [`CorrelationId::parse`], so holding one means the string is well-formed.

use crate::error::CoreError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use uuid::Uuid;

/// 8-4-4-4-12 hex groups, version nibble 4, variant nibble in {8,9,a,b}
static CORRELATION_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-4[0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}$",
    )
    .unwrap()
});

/// Opaque per-request identifier propagated across service boundaries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a fresh random correlation ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Check whether `candidate` is a canonical UUIDv4.
    ///
    /// Hex digits may be in either case. Surrounding whitespace, other UUID
    /// versions and non-RFC variants are rejected.
    pub fn is_valid(candidate: &str) -> bool {
        CORRELATION_ID_RE.is_match(candidate)
    }

    /// Narrow a string into a correlation ID, keeping its original spelling
    pub fn parse(candidate: &str) -> Option<Self> {
        Self::is_valid(candidate).then(|| Self(candidate.to_string()))
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CorrelationId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(CoreError::InvalidCorrelationId(value))
        }
    }
}

impl From<CorrelationId> for String {
    fn from(id: CorrelationId) -> Self {
        id.0
    }
}

impl AsRef<str> for CorrelationId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
