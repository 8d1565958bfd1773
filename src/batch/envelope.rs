//! Index-keyed batch response envelope
//!
//! Serializes as a JSON object whose keys are the request positions
//! (`"0"`, `"1"`, ...) in request order:
//!
//! ```json
//! {
//!   "0": {"result": {"data": {"delegates": [...]}}},
//!   "1": {"error": {"message": "...", "code": "NOT_FOUND",
//!                   "data": {"code": "NOT_FOUND", "httpStatus": 404}}}
//! }
//! ```

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::ApyError;

/// Outcome of one requested resource
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEntry {
    Data { key: &'static str, items: Value },
    Error(ApyError),
}

impl BatchEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, BatchEntry::Error(_))
    }

    /// JSON form of this entry
    pub fn to_json(&self) -> Value {
        match self {
            BatchEntry::Data { key, items } => json!({ "result": { "data": { *key: items } } }),
            BatchEntry::Error(err) => json!({
                "error": {
                    "message": err.message(),
                    "code": err.code(),
                    "data": { "code": err.code(), "httpStatus": err.http_status() },
                }
            }),
        }
    }
}

impl Serialize for BatchEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Entries in request order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResponseEnvelope {
    entries: Vec<BatchEntry>,
}

impl BatchResponseEnvelope {
    pub fn new(entries: Vec<BatchEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BatchEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Whether any entry failed
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(BatchEntry::is_error)
    }
}

impl Serialize for BatchResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (index, entry) in self.entries.iter().enumerate() {
            map.serialize_entry(&index.to_string(), entry)?;
        }
        map.end()
    }
}
