//! Recursive PII scrubber
//!
//! Scrubbing rebuilds the input: strings go through the pattern set, arrays and
//! objects are rebuilt element by element, keys are left alone and everything
//! else is copied. The input is never modified.
//!
//! Shared nodes are tracked by identity for the duration of one call, so a
//! child reachable from two parents is scrubbed once and shared by both
//! results. A back-edge of a cyclic input becomes [`CIRCULAR_MARKER`] in the
//! output, which therefore never owns a reference cycle.

use super::pattern::{PatternSet, PiiPattern};
use super::value::{Map, Node, Value, CIRCULAR_MARKER};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default traversal depth limit
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Replacement for a cut-off subtree under [`DepthPolicy::Redact`]
pub const DEPTH_REDACTION: &str = "[REDACTED-DEPTH]";

/// How long to wait for a node that is being written elsewhere
const NODE_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// What happens to a subtree that lies deeper than `max_depth`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthPolicy {
    /// Return the subtree unscrubbed
    #[default]
    PassThrough,
    /// Replace the subtree with [`DEPTH_REDACTION`]
    Redact,
}

/// Options for one scrub call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrubOptions {
    /// Deepest level that is still scrubbed; the root is level 0
    pub max_depth: usize,
    pub depth_policy: DepthPolicy,
}

impl Default for ScrubOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            depth_policy: DepthPolicy::PassThrough,
        }
    }
}

impl ScrubOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_depth_policy(mut self, depth_policy: DepthPolicy) -> Self {
        self.depth_policy = depth_policy;
        self
    }
}

/// Applies a compiled pattern set to strings and value graphs
#[derive(Debug, Clone, Default)]
pub struct PiiScrubber {
    patterns: PatternSet,
}

impl PiiScrubber {
    /// Compile `patterns`, skipping invalid entries
    pub fn new(patterns: &[PiiPattern]) -> Self {
        Self::from_pattern_set(PatternSet::compile(patterns))
    }

    pub fn from_pattern_set(patterns: PatternSet) -> Self {
        Self { patterns }
    }

    /// Scrubber over the built-in pattern catalogue
    pub fn builtin() -> Self {
        Self::from_pattern_set(super::builtin::builtin_pattern_set().clone())
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn apply_patterns(&self, input: &str) -> String {
        self.patterns.apply(input)
    }

    /// Return a scrubbed copy of `value`
    pub fn scrub(&self, value: &Value, options: &ScrubOptions) -> Value {
        let mut traversal = Traversal {
            patterns: &self.patterns,
            options,
            visited: HashMap::new(),
            in_progress: HashSet::new(),
        };
        match traversal.value(value, 0) {
            Ok(scrubbed) => scrubbed,
            Err(e) => {
                warn!("Dropping value that could not be scrubbed: {}", e);
                Value::Null
            }
        }
    }
}

/// Apply every valid pattern to `input` in order
pub fn apply_patterns(input: &str, patterns: &[PiiPattern]) -> String {
    PatternSet::compile(patterns).apply(input)
}

/// Scrub `value` with a one-off pattern list
pub fn scrub(value: &Value, patterns: &[PiiPattern], options: &ScrubOptions) -> Value {
    PiiScrubber::new(patterns).scrub(value, options)
}

#[derive(Debug, Error)]
enum TraversalError {
    #[error("shared node stayed locked for {0:?}")]
    NodeLocked(Duration),
}

struct Traversal<'a> {
    patterns: &'a PatternSet,
    options: &'a ScrubOptions,
    /// Input node identity -> finished output node
    visited: HashMap<usize, Node>,
    /// Input nodes on the current path
    in_progress: HashSet<usize>,
}

impl Traversal<'_> {
    fn value(&mut self, input: &Value, depth: usize) -> Result<Value, TraversalError> {
        let cuttable = matches!(
            input,
            Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Shared(_)
        );
        if cuttable && depth > self.options.max_depth {
            return Ok(self.cut_off(input, depth));
        }

        match input {
            Value::String(s) => Ok(Value::String(self.patterns.apply(s))),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match self.value(item, depth + 1) {
                        Ok(v) => out.push(v),
                        Err(e) => {
                            warn!(index, "Skipping array element during scrub: {}", e);
                            out.push(Value::Null);
                        }
                    }
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    match self.value(item, depth + 1) {
                        Ok(v) => {
                            out.insert(key.clone(), v);
                        }
                        Err(e) => warn!(key = %key, "Skipping key during scrub: {}", e),
                    }
                }
                Ok(Value::Object(out))
            }
            Value::Shared(node) => self.shared(node, depth),
            Value::Null
            | Value::Bool(_)
            | Value::Number(_)
            | Value::Timestamp(_)
            | Value::Opaque(_) => Ok(input.clone()),
        }
    }

    fn shared(&mut self, node: &Node, depth: usize) -> Result<Value, TraversalError> {
        let id = node.id();
        if let Some(out) = self.visited.get(&id) {
            return Ok(Value::Shared(out.clone()));
        }
        if self.in_progress.contains(&id) {
            return Ok(Value::String(CIRCULAR_MARKER.to_string()));
        }

        let guard = node
            .try_read_for(NODE_LOCK_TIMEOUT)
            .ok_or(TraversalError::NodeLocked(NODE_LOCK_TIMEOUT))?;
        self.in_progress.insert(id);
        let scrubbed = self.value(&guard, depth);
        self.in_progress.remove(&id);
        drop(guard);

        // Only finished nodes are recorded, so a failed read is retried per reference
        let out = Node::new(scrubbed?);
        self.visited.insert(id, out.clone());
        Ok(Value::Shared(out))
    }

    fn cut_off(&self, input: &Value, depth: usize) -> Value {
        warn!(
            depth,
            max_depth = self.options.max_depth,
            policy = ?self.options.depth_policy,
            "Scrub depth limit reached"
        );
        match self.options.depth_policy {
            DepthPolicy::PassThrough => input.clone(),
            DepthPolicy::Redact => Value::String(DEPTH_REDACTION.to_string()),
        }
    }
}
