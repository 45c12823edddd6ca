//! PII pattern definitions, validation and compilation

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;
use tracing::warn;

/// A named redaction rule: every match of `pattern` becomes `replacement`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiPattern {
    pub name: String,
    /// Regular expression source
    pub pattern: String,
    pub replacement: String,
}

impl PiiPattern {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// Check this pattern; see [`validate`]
    pub fn validate(&self) -> Result<(), PatternError> {
        validate(self)
    }
}

/// Why a single pattern was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("Pattern field `{0}` is missing or empty")]
    MissingField(&'static str),

    #[error("Pattern {name:?} has an invalid regex: {message}")]
    InvalidRegex { name: String, message: String },
}

/// First invalid entry of a pattern list
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Pattern at index {index} is invalid: {source}")]
pub struct PatternSetError {
    pub index: usize,
    #[source]
    pub source: PatternError,
}

/// Validate a pattern: all three fields non-empty and the source compiles.
///
/// A compile failure carries the regex engine's own message.
pub fn validate(pattern: &PiiPattern) -> Result<(), PatternError> {
    if pattern.name.trim().is_empty() {
        return Err(PatternError::MissingField("name"));
    }
    if pattern.pattern.is_empty() {
        return Err(PatternError::MissingField("pattern"));
    }
    if pattern.replacement.is_empty() {
        return Err(PatternError::MissingField("replacement"));
    }

    Regex::new(&pattern.pattern)
        .map(|_| ())
        .map_err(|e| PatternError::InvalidRegex {
            name: pattern.name.clone(),
            message: e.to_string(),
        })
}

/// Validate every pattern, stopping at the first invalid one
pub fn validate_all(patterns: &[PiiPattern]) -> Result<(), PatternSetError> {
    for (index, pattern) in patterns.iter().enumerate() {
        validate(pattern).map_err(|source| PatternSetError { index, source })?;
    }
    Ok(())
}

/// Compile a regex source, or log and return `None` so the caller can skip it
pub fn compile(source: &str) -> Option<Regex> {
    match Regex::new(source) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Skipping PII pattern that failed to compile: {}", e);
            None
        }
    }
}

/// A validated pattern with its compiled regex
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    name: String,
    regex: Regex,
    replacement: String,
}

impl CompiledPattern {
    pub fn compile(pattern: &PiiPattern) -> Result<Self, PatternError> {
        validate(pattern)?;
        // validate() just compiled the same source
        let regex = Regex::new(&pattern.pattern).map_err(|e| PatternError::InvalidRegex {
            name: pattern.name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name: pattern.name.clone(),
            regex,
            replacement: pattern.replacement.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Replace every non-overlapping match.
    ///
    /// The replacement is literal: `$1` in a replacement token is not expanded.
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.regex
            .replace_all(input, regex::NoExpand(&self.replacement))
    }

    /// Number of matches in `input`
    pub fn count(&self, input: &str) -> usize {
        self.regex.find_iter(input).count()
    }
}

/// Ordered list of compiled patterns, applied in insertion order
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<CompiledPattern>,
}

impl PatternSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every valid pattern; invalid ones are skipped with a warning
    pub fn compile(patterns: &[PiiPattern]) -> Self {
        let mut set = Self::new();
        for pattern in patterns {
            match CompiledPattern::compile(pattern) {
                Ok(compiled) => set.patterns.push(compiled),
                Err(e) => warn!("Skipping PII pattern: {}", e),
            }
        }
        set
    }

    /// Compile patterns, failing on the first invalid one
    pub fn try_compile(patterns: &[PiiPattern]) -> Result<Self, PatternSetError> {
        let patterns = patterns
            .iter()
            .enumerate()
            .map(|(index, p)| {
                CompiledPattern::compile(p).map_err(|source| PatternSetError { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn push(&mut self, pattern: CompiledPattern) {
        self.patterns.push(pattern);
    }

    /// Run every pattern over `input` in order
    pub fn apply(&self, input: &str) -> String {
        let mut result = input.to_string();
        for pattern in &self.patterns {
            if let Cow::Owned(replaced) = pattern.apply(&result) {
                result = replaced;
            }
        }
        result
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledPattern> {
        self.patterns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> PiiPattern {
        PiiPattern::new("email", r"[\w+.-]+@[\w.-]+\.\w{2,}", "[REDACTED-EMAIL]")
    }

    #[test]
    fn test_validate_ok() {
        assert_eq!(email().validate(), Ok(()));
    }

    #[test]
    fn test_validate_missing_fields() {
        let mut p = email();
        p.name = "  ".to_string();
        assert_eq!(validate(&p), Err(PatternError::MissingField("name")));

        let mut p = email();
        p.pattern.clear();
        assert_eq!(validate(&p), Err(PatternError::MissingField("pattern")));

        let mut p = email();
        p.replacement.clear();
        assert_eq!(validate(&p), Err(PatternError::MissingField("replacement")));
    }

    #[test]
    fn test_validate_reports_engine_message() {
        let p = PiiPattern::new("broken", "(unclosed", "[X]");
        match validate(&p) {
            Err(PatternError::InvalidRegex { name, message }) => {
                assert_eq!(name, "broken");
                assert!(!message.is_empty());
            }
            other => panic!("expected InvalidRegex, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_all_reports_first_index() {
        let patterns = vec![
            email(),
            PiiPattern::new("bad", "[", "[X]"),
            PiiPattern::new("", "a", "b"),
        ];
        let err = validate_all(&patterns).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(matches!(err.source, PatternError::InvalidRegex { .. }));
    }

    #[test]
    fn test_compile_returns_none_on_failure() {
        assert!(compile("a+").is_some());
        assert!(compile("(?P<").is_none());
    }

    #[test]
    fn test_pattern_set_skips_invalid_and_keeps_order() {
        let patterns = vec![
            PiiPattern::new("ab", "ab", "X"),
            PiiPattern::new("bad", "(", "?"),
            PiiPattern::new("x", "X", "Y"),
        ];
        let set = PatternSet::compile(&patterns);
        assert_eq!(set.len(), 2);
        // "ab" -> "X" first, then "X" -> "Y"
        assert_eq!(set.apply("ab ab"), "Y Y");
    }

    #[test]
    fn test_try_compile_fails_on_invalid() {
        let patterns = vec![email(), PiiPattern::new("bad", "(", "?")];
        assert_eq!(PatternSet::try_compile(&patterns).unwrap_err().index, 1);
    }

    #[test]
    fn test_replacement_is_literal() {
        let p = CompiledPattern::compile(&PiiPattern::new("digits", r"(\d+)", "$1-gone")).unwrap();
        assert_eq!(p.apply("id 42"), "id $1-gone");
        assert_eq!(p.count("1 2 3"), 3);
    }
}
