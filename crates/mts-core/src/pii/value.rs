//! Structured values the scrubber walks
//!
//! `Value` mirrors JSON and adds three cases JSON cannot express:
//!
//! - [`Value::Shared`]: a node with identity, so graphs can share children or
//!   contain cycles
//! - [`Value::Timestamp`]: a point in time, passed through untouched
//! - [`Value::Opaque`]: any other host object (compiled patterns, sets,
//!   callbacks), passed through by identity

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Serialize, Serializer};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Marker written where serialization meets a back-edge
pub const CIRCULAR_MARKER: &str = "[Circular]";

/// Key/value map of a [`Value::Object`]
pub type Map = BTreeMap<String, Value>;

/// Closed, recursively defined value type
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<Value>),
    Object(Map),
    Shared(Node),
    Timestamp(DateTime<Utc>),
    Opaque(Opaque),
}

impl Value {
    /// Wrap this value in a fresh shared node
    pub fn shared(self) -> Self {
        Value::Shared(Node::new(self))
    }

    /// Build an object from key/value pairs
    pub fn object<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key of a plain object
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Convert to plain JSON.
    ///
    /// Shared nodes are inlined; a node reached again while it is still being
    /// converted becomes [`CIRCULAR_MARKER`]. Timestamps become RFC 3339 strings
    /// with millisecond precision and opaque values become `"[<type name>]"`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut path = Vec::new();
        self.to_json_inner(&mut path)
    }

    fn to_json_inner(&self, path: &mut Vec<usize>) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json_inner(path)).collect())
            }
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json_inner(path)))
                    .collect(),
            ),
            Value::Shared(node) => {
                let id = node.id();
                if path.contains(&id) {
                    return serde_json::Value::String(CIRCULAR_MARKER.to_string());
                }
                path.push(id);
                let json = node.read().to_json_inner(path);
                path.pop();
                json
            }
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Value::Opaque(opaque) => serde_json::Value::String(format!("[{}]", opaque.type_name())),
        }
    }
}

/// Structural equality for JSON-like cases; shared nodes and opaque values
/// compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Shared(a), Value::Shared(b)) => Node::ptr_eq(a, b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => Opaque::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n.into())
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    /// NaN and infinities have no JSON number form and become `Null`
    fn from(n: f64) -> Self {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Object(map)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Shared(node)
    }
}

impl From<Opaque> for Value {
    fn from(opaque: Opaque) -> Self {
        Value::Opaque(opaque)
    }
}

/// Reference-counted value with identity
#[derive(Clone, Default)]
pub struct Node(Arc<RwLock<Value>>);

impl Node {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.0.read()
    }

    /// Read access, giving up after `timeout` if a writer holds the node
    pub fn try_read_for(&self, timeout: Duration) -> Option<RwLockReadGuard<'_, Value>> {
        self.0.try_read_for(timeout)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Value> {
        self.0.write()
    }

    /// Replace the node's content
    pub fn set(&self, value: Value) {
        *self.0.write() = value;
    }

    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Identity key, stable while the node is alive
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    #[cfg(test)]
    pub(crate) fn downgrade(&self) -> std::sync::Weak<RwLock<Value>> {
        Arc::downgrade(&self.0)
    }
}

impl fmt::Debug for Node {
    // Content is not printed: a cyclic graph would recurse forever
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({:#x})", self.id())
    }
}

/// Host object the scrubber must not look inside
#[derive(Clone)]
pub struct Opaque {
    type_name: &'static str,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Opaque {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            inner: Arc::new(value),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn ptr_eq(a: &Opaque, b: &Opaque) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opaque")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_round_trip() {
        let json = json!({"a": [1, "two", null, true], "b": {"c": 3.5}});
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_cycle_serializes_with_marker() {
        let node = Node::new(Value::Null);
        node.set(Value::object([("name", Value::from("loop")), ("self", Value::Shared(node.clone()))]));

        let json = Value::Shared(node).to_json();
        assert_eq!(json, json!({"name": "loop", "self": "[Circular]"}));
    }

    #[test]
    fn test_shared_sibling_is_not_circular() {
        let child = Value::object([("x", 1)]).shared();
        let parent = Value::object([("left", child.clone()), ("right", child)]);
        assert_eq!(parent.to_json(), json!({"left": {"x": 1}, "right": {"x": 1}}));
    }

    #[test]
    fn test_opaque_and_timestamp_rendering() {
        let ts = DateTime::parse_from_rfc3339("2026-01-02T03:04:05.678Z")
            .unwrap()
            .with_timezone(&Utc);
        let value = Value::object([
            ("at", Value::from(ts)),
            ("handle", Value::from(Opaque::new(42u8))),
        ]);
        assert_eq!(
            value.to_json(),
            json!({"at": "2026-01-02T03:04:05.678Z", "handle": "[u8]"})
        );
    }

    #[test]
    fn test_identity_equality() {
        let a = Node::new(Value::from("same"));
        let b = Node::new(Value::from("same"));
        assert_eq!(Value::Shared(a.clone()), Value::Shared(a.clone()));
        assert_ne!(Value::Shared(a), Value::Shared(b));
        assert_eq!(Value::from(f64::NAN), Value::Null);
    }

    #[test]
    fn test_node_debug_does_not_recurse() {
        let node = Node::new(Value::Null);
        node.set(Value::Shared(node.clone()));
        assert!(format!("{:?}", node).starts_with("Node(0x"));
    }
}
