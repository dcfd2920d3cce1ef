//! Core data types for the keyseries store
//!
//! - `Value` / `ValueType`: the closed set of payload kinds
//! - `Sample`: one measurement as submitted by a producer
//! - `Entry`: one measurement as stored, always timestamped
//! - `Envelope`: an atomic batch of samples under a single path

use crate::storage::path::KeyPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared kind of an entry's value
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    String,
    Blob,
}

impl ValueType {
    pub fn all() -> &'static [ValueType] {
        &[
            ValueType::Boolean,
            ValueType::Integer,
            ValueType::Float,
            ValueType::String,
            ValueType::Blob,
        ]
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Integer => write!(f, "integer"),
            ValueType::Float => write!(f, "float"),
            ValueType::String => write!(f, "string"),
            ValueType::Blob => write!(f, "blob"),
        }
    }
}

/// Dynamically typed payload of an entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Blob(Vec<u8>),
}

impl Value {
    /// The kind this value naturally has
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Boolean,
            Value::Int(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::String,
            Value::Blob(_) => ValueType::Blob,
        }
    }

    /// Convert to the declared kind.
    ///
    /// Supported conversions: identity, integer to float, integral float to
    /// integer, and boolean to/from the integers 0 and 1. Anything else is
    /// returned unchanged as the error.
    pub fn coerce(self, target: ValueType) -> Result<Value, Value> {
        match (self, target) {
            (v, t) if v.value_type() == t => Ok(v),
            (Value::Int(i), ValueType::Float) => Ok(Value::Float(i as f64)),
            (Value::Float(f), ValueType::Integer)
                if f.is_finite()
                    && f.fract() == 0.0
                    && f >= i64::MIN as f64
                    && f < i64::MAX as f64 =>
            {
                Ok(Value::Int(f as i64))
            }
            (Value::Bool(b), ValueType::Integer) => Ok(Value::Int(i64::from(b))),
            (Value::Int(0), ValueType::Boolean) => Ok(Value::Bool(false)),
            (Value::Int(1), ValueType::Boolean) => Ok(Value::Bool(true)),
            (v, _) => Err(v),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Blob(bytes) => {
                write!(f, "<{} bytes", bytes.len())?;
                if !bytes.is_empty() {
                    write!(f, ": ")?;
                    for byte in bytes.iter().take(8) {
                        write!(f, "{:02x}", byte)?;
                    }
                    if bytes.len() > 8 {
                        write!(f, "..")?;
                    }
                }
                write!(f, ">")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

/// A measurement as submitted by a producer.
///
/// The declared type defaults to the value's own kind and the timestamp is
/// assigned by the store when absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub key: String,
    pub value: Value,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Sample {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            value_type: None,
            timestamp: None,
        }
    }

    /// Builder: declare the value's kind
    pub fn typed(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Builder: set an explicit timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Resolve the declared type and timestamp into a stored entry
    pub fn into_entry(self, now: DateTime<Utc>) -> Result<Entry, Sample> {
        let declared = self.value_type.unwrap_or_else(|| self.value.value_type());
        match self.value.coerce(declared) {
            Ok(value) => Ok(Entry {
                key: self.key,
                value,
                value_type: declared,
                timestamp: self.timestamp.unwrap_or(now),
            }),
            Err(value) => Err(Sample {
                key: self.key,
                value,
                value_type: self.value_type,
                timestamp: self.timestamp,
            }),
        }
    }
}

/// A stored, immutable measurement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub key: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub timestamp: DateTime<Utc>,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<Value>, timestamp: DateTime<Utc>) -> Self {
        let value = value.into();
        Self {
            key: key.into(),
            value_type: value.value_type(),
            value,
            timestamp,
        }
    }
}

/// An atomic write batch under one path
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub path: KeyPath,
    #[serde(default)]
    pub entries: Vec<Sample>,
}

impl Envelope {
    pub fn new(path: KeyPath) -> Self {
        Self {
            path,
            entries: Vec::new(),
        }
    }

    /// Builder: append a sample
    pub fn sample(mut self, sample: Sample) -> Self {
        self.entries.push(sample);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_value_types() {
        assert_eq!(Value::from(true).value_type(), ValueType::Boolean);
        assert_eq!(Value::from(3i64).value_type(), ValueType::Integer);
        assert_eq!(Value::from(1.5).value_type(), ValueType::Float);
        assert_eq!(Value::from("v").value_type(), ValueType::String);
        assert_eq!(Value::from(vec![1u8, 2]).value_type(), ValueType::Blob);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(Value::Int(2).coerce(ValueType::Float), Ok(Value::Float(2.0)));
        assert_eq!(Value::Float(4.0).coerce(ValueType::Integer), Ok(Value::Int(4)));
        assert_eq!(Value::Bool(true).coerce(ValueType::Integer), Ok(Value::Int(1)));
        assert_eq!(Value::Int(0).coerce(ValueType::Boolean), Ok(Value::Bool(false)));

        assert!(Value::Float(4.5).coerce(ValueType::Integer).is_err());
        assert!(Value::Float(f64::NAN).coerce(ValueType::Integer).is_err());
        // 2^63 is one past i64::MAX
        assert!(Value::Float(9_223_372_036_854_775_808.0).coerce(ValueType::Integer).is_err());
        assert_eq!(
            Value::Float(-9_223_372_036_854_775_808.0).coerce(ValueType::Integer),
            Ok(Value::Int(i64::MIN))
        );
        assert!(Value::Int(7).coerce(ValueType::Boolean).is_err());
        assert!(Value::from("v").coerce(ValueType::Float).is_err());
        assert!(Value::Blob(vec![]).coerce(ValueType::String).is_err());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::from("abc").to_string(), "abc");
        assert_eq!(Value::Blob(vec![0xde, 0xad]).to_string(), "<2 bytes: dead>");
        assert_eq!(Value::Blob(vec![]).to_string(), "<0 bytes>");
    }

    #[test]
    fn test_sample_into_entry() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let explicit = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();

        let entry = Sample::new("cpu", 3i64)
            .typed(ValueType::Float)
            .into_entry(now)
            .unwrap();
        assert_eq!(entry.value, Value::Float(3.0));
        assert_eq!(entry.value_type, ValueType::Float);
        assert_eq!(entry.timestamp, now);

        let entry = Sample::new("name", "v").at(explicit).into_entry(now).unwrap();
        assert_eq!(entry.value_type, ValueType::String);
        assert_eq!(entry.timestamp, explicit);

        let rejected = Sample::new("name", "v")
            .typed(ValueType::Integer)
            .into_entry(now)
            .unwrap_err();
        assert_eq!(rejected.value, Value::from("v"));
    }

    #[test]
    fn test_envelope_json() {
        let json = r#"{
            "path": "plant.line1",
            "entries": [
                {"key": "temp", "value": {"float": 21.5}},
                {"key": "state", "value": {"str": "running"}, "type": "string",
                 "timestamp": "2024-01-01T00:00:00Z"}
            ]
        }"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.path.to_string(), "plant.line1");
        assert_eq!(envelope.len(), 2);
        assert_eq!(envelope.entries[0].value, Value::Float(21.5));
        assert!(envelope.entries[0].timestamp.is_none());
        assert_eq!(envelope.entries[1].value_type, Some(ValueType::String));
    }

    #[test]
    fn test_entry_bincode() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entry = Entry::new("blob", vec![1u8, 2, 3], ts);
        let bytes = bincode::serialize(&entry).unwrap();
        let back: Entry = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, entry);
    }
}
