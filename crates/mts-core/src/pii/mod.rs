//! PII redaction: patterns, the value model and the recursive scrubber

pub mod builtin;
pub mod pattern;
pub mod scrubber;
pub mod value;

pub use builtin::{builtin_pattern_set, builtin_patterns};
pub use pattern::{
    compile, validate, validate_all, CompiledPattern, PatternError, PatternSet, PatternSetError,
    PiiPattern,
};
pub use scrubber::{
    apply_patterns, scrub, DepthPolicy, PiiScrubber, ScrubOptions, DEFAULT_MAX_DEPTH,
    DEPTH_REDACTION,
};
pub use value::{Map, Node, Opaque, Value, CIRCULAR_MARKER};
