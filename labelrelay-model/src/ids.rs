use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend-assigned task identifier.
///
/// Annotation services disagree on whether task ids are integers or strings,
/// so both forms are carried verbatim and compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    Int(i64),
    Str(String),
}

impl TaskId {
    /// Interpret a JSON value returned by a backend as a task id.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(TaskId::Int),
            Value::String(s) if !s.is_empty() => Some(TaskId::Str(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            TaskId::Int(n) => Value::from(*n),
            TaskId::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        TaskId::Int(value)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        TaskId::Str(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        TaskId::Str(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Int(n) => write!(f, "{n}"),
            TaskId::Str(s) => f.write_str(s),
        }
    }
}

/// Stable identity of a record inside an annotation batch.
///
/// Mirrors the value stored in the record's identity field, so an integer id
/// `2000` and a string id `"2000"` are distinct samples.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleId {
    Int(i64),
    Str(String),
}

impl SampleId {
    pub fn to_json(&self) -> Value {
        match self {
            SampleId::Int(n) => Value::from(*n),
            SampleId::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl From<i64> for SampleId {
    fn from(value: i64) -> Self {
        SampleId::Int(value)
    }
}

impl From<&str> for SampleId {
    fn from(value: &str) -> Self {
        SampleId::Str(value.to_string())
    }
}

impl From<String> for SampleId {
    fn from(value: String) -> Self {
        SampleId::Str(value)
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleId::Int(n) => write!(f, "{n}"),
            SampleId::Str(s) => f.write_str(s),
        }
    }
}
