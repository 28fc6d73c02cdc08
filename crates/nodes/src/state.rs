//! The state record threaded through every node of a run.
//!
//! A `State` is an open mapping from field name to JSON value. Any node may
//! add, overwrite or remove fields; the engine itself never drops one. A small
//! set of field names carry meaning for the engine and for the refinement
//! loop, see the constants below.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Validity flag written by validator nodes (`bool`).
pub const VALID: &str = "valid";

/// Set to `true` when a run was cut short by its loop ceiling (`bool`).
pub const LOOP_LIMIT_REACHED: &str = "loop_limit_reached";

/// Human-readable description of a recoverable node failure (`string`).
pub const ERROR: &str = "error";

/// Mutable record passed from node to node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Map<String, Value>);

impl State {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a state from a JSON value. Only objects are accepted; `null`
    /// yields an empty state.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            Value::Null => Some(Self::new()),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Missing or non-boolean fields read as `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        self.0.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// Insert or overwrite a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copy every field of `other` into `self`, overwriting on collision.
    pub fn merge(&mut self, other: State) {
        for (k, v) in other.0 {
            self.0.insert(k, v);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    // ------------------------------------------------------------------
    // Conventional fields
    // ------------------------------------------------------------------

    pub fn is_valid(&self) -> bool {
        self.get_bool(VALID)
    }

    pub fn loop_limit_reached(&self) -> bool {
        self.get_bool(LOOP_LIMIT_REACHED)
    }

    pub fn mark_loop_limit_reached(&mut self) {
        self.insert(LOOP_LIMIT_REACHED, true);
    }

    pub fn error(&self) -> Option<&str> {
        self.get_str(ERROR)
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.insert(ERROR, message.into());
    }
}

impl From<Map<String, Value>> for State {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for State {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
