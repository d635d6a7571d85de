//! Evaluation context: named bindings visible to expressions

use crate::value::{Function, Value};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Binding that always holds the configuration globals
pub const GLOBALS_BINDING: &str = "globals";
/// Binding for the current-time accessor
pub const NOW_BINDING: &str = "now";
/// Binding for the timestamp-parsing accessor
pub const TIMESTAMP_BINDING: &str = "timestamp";

/// Mapping from top-level variable names to values.
///
/// Typical top-level keys are `user`, `request` and `payment`; any key is
/// accepted here and the compiler decides which are referenceable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    bindings: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object. Anything other than an object is rejected.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(Self {
                bindings: map
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            }),
            other => Err(Error::InvalidContext(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Parse a context from JSON text
    pub fn from_json_str(text: &str) -> Result<Self> {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| Error::InvalidContext(e.to_string()))?;
        Self::from_json(json)
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a binding, returning the previous value if any
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.bindings.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            bindings: iter.into_iter().collect(),
        }
    }
}

/// Build the context a rule is evaluated against.
///
/// Starts from the caller's bindings and then injects `globals`, `now` and
/// `timestamp`, overwriting any caller-supplied value under those names.
pub fn build_evaluation_context(
    user_context: Context,
    globals: &serde_json::Map<String, serde_json::Value>,
) -> Context {
    let mut ctx = user_context;
    ctx.insert(
        GLOBALS_BINDING,
        Value::from_json(serde_json::Value::Object(globals.clone())),
    );
    ctx.insert(NOW_BINDING, Value::Function(Function::Now));
    ctx.insert(TIMESTAMP_BINDING, Value::Function(Function::Timestamp));
    ctx
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
