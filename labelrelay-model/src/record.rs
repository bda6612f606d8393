use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::{ModelError, Result},
    ids::SampleId,
};

/// One unit of data being annotated: a JSON object of named fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Insert or replace a single field, returning the previous value.
    pub fn set(
        &mut self,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Read the record's identity from `field`.
    ///
    /// A missing or `null` field yields `Ok(None)`. Integers and non-empty
    /// strings are accepted; any other JSON shape is rejected.
    pub fn sample_id(&self, field: &str) -> Result<Option<SampleId>> {
        match self.0.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(SampleId::Str(s.clone()))),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(|n| Some(SampleId::Int(n)))
                .ok_or_else(|| ModelError::InvalidSampleId {
                    field: field.to_string(),
                    reason: format!("{n} is not an integer"),
                }),
            Some(other) => Err(ModelError::InvalidSampleId {
                field: field.to_string(),
                reason: format!("unsupported {} value", json_kind(other)),
            }),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Record {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

impl TryFrom<Value> for Record {
    type Error = ModelError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(ModelError::NotAnObject(json_kind(&other))),
        }
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
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
