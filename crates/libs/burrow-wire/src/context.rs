use std::collections::BTreeMap;

use rmpv::Value;
use serde::{Deserialize, Serialize};

use crate::ids::Guid;

/// Open-ended extension field set carried by call contexts and pings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Extensions(BTreeMap<String, Value>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
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

    /// Field-level merge: every field present in `other` overwrites the
    /// field of the same name here.
    pub fn merge_from(&mut self, other: &Extensions) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

/// Per-call state propagated from client to server.
///
/// The caller's identity is deliberately absent: the server attaches the
/// identity reported by its transport, never one read off the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallContext {
    #[serde(default)]
    pub session_id: Option<Guid>,
    #[serde(default)]
    pub extensions: Extensions,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extensions.set(key, value);
        self
    }

    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    /// The changes that turn `original` into `self`, or `None` when the two
    /// are equal by value.
    pub fn delta_from(&self, original: &CallContext) -> Option<ContextDelta> {
        if self == original {
            return None;
        }

        let mut delta = ContextDelta::default();
        if self.session_id != original.session_id {
            match self.session_id {
                Some(id) => delta.session_id = Some(id),
                None => delta.session_cleared = true,
            }
        }
        for (key, value) in self.extensions.iter() {
            if original.extensions.get(key) != Some(value) {
                delta.set.set(key.clone(), value.clone());
            }
        }
        for (key, _) in original.extensions.iter() {
            if !self.extensions.contains_key(key) {
                delta.removed.push(key.clone());
            }
        }
        Some(delta)
    }

    pub fn apply_delta(&mut self, delta: &ContextDelta) {
        if delta.session_cleared {
            self.session_id = None;
        }
        if let Some(id) = delta.session_id {
            self.session_id = Some(id);
        }
        for key in &delta.removed {
            self.extensions.remove(key);
        }
        self.extensions.merge_from(&delta.set);
    }
}

/// Changes made to a call context by the server, returned in the response
/// header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDelta {
    #[serde(default)]
    pub session_id: Option<Guid>,
    #[serde(default)]
    pub session_cleared: bool,
    #[serde(default)]
    pub set: Extensions,
    #[serde(default)]
    pub removed: Vec<String>,
}
