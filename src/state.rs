//! Per-operation resource state.
//!
//! [`ResourceData`] is the view a resource operation gets of one resource
//! instance. It keeps two layers:
//!
//! - the **baseline**: the last known remote values (prior state, or whatever
//!   a read just wrote with [`ResourceData::set`])
//! - the **declared** values: what the configuration/plan asks for
//!
//! An attribute is changed when it is declared and differs from the baseline.

use serde_json::{Map, Value};

/// State store for a single resource instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    id: String,
    baseline: Map<String, Value>,
    declared: Map<String, Value>,
}

impl ResourceData {
    /// Create state from a prior state and the declared (planned) values.
    ///
    /// Non-object values are treated as empty.
    pub fn new(prior: Value, declared: Value) -> Self {
        let baseline = into_map(prior);
        let id = baseline
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let mut declared = into_map(declared);
        declared.remove("id");
        declared.retain(|_, v| !v.is_null());

        Self {
            id,
            baseline,
            declared,
        }
    }

    /// State for an existing resource with nothing newly declared.
    pub fn from_state(state: Value) -> Self {
        Self::new(state, Value::Null)
    }

    /// State for a resource that doesn't exist yet.
    pub fn from_declared(declared: Value) -> Self {
        Self::new(Value::Null, declared)
    }

    /// The resource identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Set the resource identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// The effective value of an attribute: declared, then baseline.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.declared
            .get(key)
            .or_else(|| self.baseline.get(key))
            .filter(|v| !v.is_null())
    }

    /// The effective value of a string attribute, or `""`.
    pub fn get_str(&self, key: &str) -> &str {
        self.get(key).and_then(Value::as_str).unwrap_or_default()
    }

    /// Whether the attribute has a non-zero value.
    pub fn get_ok(&self, key: &str) -> bool {
        match self.get(key) {
            None => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Bool(b)) => *b,
            Some(_) => true,
        }
    }

    /// Write a value into the baseline.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.baseline.insert(key.into(), value.into());
    }

    /// Whether the declared value of an attribute differs from the baseline.
    pub fn has_change(&self, key: &str) -> bool {
        match self.declared.get(key) {
            Some(declared) => self.baseline.get(key).unwrap_or(&Value::Null) != declared,
            None => false,
        }
    }

    /// The baseline value of an attribute and its declared value, if any.
    pub fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>) {
        (self.baseline.get(key), self.declared.get(key))
    }

    /// Consume into the state handed back to the orchestrator.
    ///
    /// Declared values win over the baseline.
    pub fn into_state(self) -> Value {
        let mut state = self.baseline;
        state.extend(self.declared);
        state.insert("id".to_string(), Value::String(self.id));
        Value::Object(state)
    }
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
