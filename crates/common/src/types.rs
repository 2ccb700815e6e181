// Core domain types shared across all canvasdeck crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Identifier of a page in the remote document store.
///
/// Opaque to the session core; it is only ever compared, hashed, and
/// percent-encoded into request paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageId(String);

impl PageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A serialized capture of one page exchanged with the editor or the remote API.
///
/// `components` and `styles` are opaque editor project data; `html` and `css`
/// are render caches the server keeps alongside them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    #[serde(default = "empty_array")]
    pub components: Value,
    #[serde(default = "empty_array")]
    pub styles: Value,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: String,
}

impl Default for PageSnapshot {
    fn default() -> Self {
        Self { components: empty_array(), styles: empty_array(), html: String::new(), css: String::new() }
    }
}

impl PageSnapshot {
    /// Reject shapes the remote store refuses with a schema error.
    ///
    /// `components` must be an array or object (a single root component);
    /// `styles` may additionally be a raw CSS string.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if !matches!(self.components, Value::Array(_) | Value::Object(_)) {
            return Err(SnapshotError::InvalidComponents(json_kind(&self.components)));
        }
        if !matches!(self.styles, Value::Array(_) | Value::Object(_) | Value::String(_)) {
            return Err(SnapshotError::InvalidStyles(json_kind(&self.styles)));
        }
        Ok(())
    }

    /// Number of top-level components (0 for an object root).
    pub fn component_count(&self) -> usize {
        match &self.components {
            Value::Array(items) => items.len(),
            Value::Object(_) => 1,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("components must be an array or object, got {0}")]
    InvalidComponents(&'static str),

    #[error("styles must be an array, object, or CSS string, got {0}")]
    InvalidStyles(&'static str),
}

/// Aggregate outcome of a save-all pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl SaveSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
