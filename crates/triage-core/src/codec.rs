//! Scalar-only payload codec for stream records.
//!
//! Log storage accepts only flat string/number/binary field values. Encoding
//! flattens a JSON object field by field; decoding is opportunistic and tries
//! to JSON-parse every string it sees.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// A single stream field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
}

/// Flat field map of one stream record.
pub type EncodedFields = BTreeMap<String, FieldValue>;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("record must serialize to a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FieldValue {
    /// Wire bytes as written to the log.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Str(s) => s.as_bytes().to_vec(),
            Self::Int(i) => i.to_string().into_bytes(),
            Self::Float(f) => float_text(*f).into_bytes(),
            Self::Bytes(b) => b.clone(),
        }
    }

    /// Field read back from the log: UTF-8 becomes `Str`, anything else stays binary.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(s) => Self::Str(s),
            Err(e) => Self::Bytes(e.into_bytes()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Text form of the value, lossy for non-UTF-8 bytes.
    pub fn to_text(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => float_text(*f),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }
}

/// Float text that keeps a fractional part (`1.0`, not `1`).
fn float_text(f: f64) -> String {
    Number::from_f64(f)
        .map(|n| n.to_string())
        .unwrap_or_else(|| f.to_string())
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Str(if value { "true" } else { "false" }.to_string())
    }
}

/// Encode one JSON value into a scalar-safe field.
pub fn encode_value(value: &Value) -> FieldValue {
    match value {
        Value::Null => FieldValue::Str(String::new()),
        Value::Bool(b) => FieldValue::from(*b),
        Value::String(s) => FieldValue::Str(s.clone()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                FieldValue::Int(i)
            } else if let Some(f) = n.as_f64().filter(|_| n.is_f64()) {
                FieldValue::Float(f)
            } else {
                // u64 above i64::MAX
                FieldValue::Str(n.to_string())
            }
        }
        composite @ (Value::Array(_) | Value::Object(_)) => {
            FieldValue::Str(composite.to_string())
        }
    }
}

/// Encode a flat record.
pub fn encode(record: &Map<String, Value>) -> EncodedFields {
    record
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect()
}

/// Serialize `record` through serde_json and encode the resulting object.
pub fn encode_serializable<T: Serialize>(record: &T) -> Result<EncodedFields, CodecError> {
    match serde_json::to_value(record)? {
        Value::Object(map) => Ok(encode(&map)),
        Value::Null => Err(CodecError::NotAnObject("null")),
        Value::Bool(_) => Err(CodecError::NotAnObject("bool")),
        Value::Number(_) => Err(CodecError::NotAnObject("number")),
        Value::String(_) => Err(CodecError::NotAnObject("string")),
        Value::Array(_) => Err(CodecError::NotAnObject("array")),
    }
}

/// Decode one field. The empty string is `null`; any other string is
/// JSON-parsed when it parses, otherwise returned as-is.
pub fn decode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Int(i) => Value::from(*i),
        FieldValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        FieldValue::Str(s) => decode_text(s),
        FieldValue::Bytes(b) => decode_text(&String::from_utf8_lossy(b)),
    }
}

fn decode_text(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Decode a record with opportunistic JSON parsing.
///
/// A string field that happens to look like JSON (`"true"`, `"42"`) comes back
/// as a boolean or number. Use [`decode_raw`] when that matters.
pub fn decode(fields: &EncodedFields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}

/// Decode a record keeping every field as its raw text.
pub fn decode_raw(fields: &EncodedFields) -> Map<String, Value> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.to_text())))
        .collect()
}
