use crate::error::{JsonStashError, Result};
use serde_json::{Map, Value};

/// A schema-less record: field name -> dynamic JSON value, insertion ordered.
pub type Record = Map<String, Value>;

pub fn encode(record: &Record) -> Result<String> {
    serde_json::to_string(record).map_err(|e| JsonStashError::Serialization(e.to_string()))
}

pub fn decode(text: &str) -> Result<Record> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| JsonStashError::Deserialization(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(JsonStashError::Deserialization(format!(
            "expected a JSON object at the root, found {}",
            type_name(&other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
