//! Transaction payloads
//!
//! A transaction is a map from field name to [`Value`]. Fields are kept in
//! a `BTreeMap` so serializing the same transaction always yields the same
//! bytes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
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
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            // JSON has no byte strings
            Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(serde_json::Value::from).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Structured payload carried by an envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    fields: BTreeMap<String, Value>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a field, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical binary form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Parse the binary form produced by [`Transaction::to_bytes`]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Build from a JSON object
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match Value::from(json) {
            Value::Map(fields) => Ok(Transaction { fields }),
            _ => Err(Error::Deserialization(
                "transaction must be a JSON object".to_string(),
            )),
        }
    }

    /// JSON view, byte strings rendered as hex
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Transaction {
        Transaction::new()
            .with("op", "transfer")
            .with("amount", 1250i64)
            .with("memo", vec![0u8, 1, 2, 255])
            .with("urgent", true)
    }

    #[test]
    fn test_bytes_roundtrip() {
        let tx = sample();
        let bytes = tx.to_bytes().unwrap();
        assert_eq!(Transaction::from_bytes(&bytes).unwrap(), tx);
    }

    #[test]
    fn test_serialization_is_canonical() {
        let a = Transaction::new().with("b", 2i64).with("a", 1i64);
        let b = Transaction::new().with("a", 1i64).with("b", 2i64);
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
    }

    #[test]
    fn test_from_json() {
        let tx = Transaction::from_json(json!({
            "op": "put",
            "count": 3,
            "ratio": 0.5,
            "tags": ["x", null],
            "meta": {"nested": false}
        }))
        .unwrap();

        assert_eq!(tx.len(), 5);
        assert_eq!(tx.get("op"), Some(&Value::Text("put".to_string())));
        assert_eq!(tx.get("count"), Some(&Value::Int(3)));
        assert_eq!(tx.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(
            tx.get("tags"),
            Some(&Value::List(vec![Value::Text("x".to_string()), Value::Null]))
        );
        assert!(matches!(tx.get("meta"), Some(Value::Map(m)) if m.len() == 1));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(Transaction::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_to_json_renders_bytes_as_hex() {
        let json = sample().to_json();
        assert_eq!(json["memo"], json!("000102ff"));
        assert_eq!(json["amount"], json!(1250));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(Transaction::from_bytes(&[0xff; 3]).is_err());
    }
}
