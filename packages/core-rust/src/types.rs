//! Payload types shared by the record store: serialized [`Data`], object
//! [`Value`]s and the [`InMemoryFormat`] a map keeps its values in.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque serialized form of a key or value.
///
/// The record store never looks inside a `Data` beyond equality, hashing and
/// its byte length (used for cost estimation). Producing and consuming the
/// bytes is the job of a [`SerializationService`](crate::codec::SerializationService).
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Data(Bytes);

impl Data {
    /// Wraps already-serialized bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Borrows the serialized bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns a cheap reference-counted handle to the underlying buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    /// Serialized length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Data({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<Bytes> for Data {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Data {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

/// Generic runtime value type for map entries.
///
/// Supports all JSON-compatible types plus binary data. This is the
/// deserialized ("object") representation of a value; the serialized
/// representation is [`Data`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// JSON null.
    Null,
    /// JSON boolean.
    Bool(bool),
    /// JSON integer (signed 64-bit).
    Int(i64),
    /// JSON floating-point (64-bit IEEE 754).
    Float(f64),
    /// JSON string (UTF-8).
    String(String),
    /// Binary data (not directly representable in JSON).
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// JSON array (ordered sequence of values).
    Array(Vec<Value>),
    /// JSON object. Uses `BTreeMap` for deterministic serialization order.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Rough heap footprint of the value in bytes.
    ///
    /// Only used to feed entry cost estimation; it is not an exact measure.
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        match self {
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Float(_) => 8,
            Self::String(s) => s.len(),
            Self::Bytes(b) => b.len(),
            Self::Array(items) => items.iter().map(Self::estimated_size).sum(),
            Self::Map(fields) => fields
                .iter()
                .map(|(k, v)| k.len() + v.estimated_size())
                .sum(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// How a map keeps its values in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InMemoryFormat {
    /// Values are kept serialized as [`Data`].
    #[default]
    Binary,
    /// Values are kept deserialized as [`Value`].
    Object,
    /// Values are kept serialized in separately managed blocks whose release
    /// is deferred until the owning storage disposes them.
    Native,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_equality_is_bytewise() {
        let a = Data::from(vec![1, 2, 3]);
        let b = Data::from(&[1_u8, 2, 3][..]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(!a.is_empty());
        assert_ne!(a, Data::from(vec![1, 2]));
    }

    #[test]
    fn data_debug_hides_payload() {
        let data = Data::from(vec![0xde, 0xad]);
        assert_eq!(format!("{data:?}"), "Data(2 bytes)");
    }

    #[test]
    fn estimated_size_sums_nested_values() {
        let mut fields = BTreeMap::new();
        fields.insert("amt".to_string(), Value::Int(10));
        fields.insert("tags".to_string(), Value::Array(vec!["a".into(), "bc".into()]));
        let value = Value::Map(fields);
        // "amt"(3) + 8 + "tags"(4) + 1 + 2
        assert_eq!(value.estimated_size(), 18);
    }

    #[test]
    fn in_memory_format_defaults_to_binary() {
        assert_eq!(InMemoryFormat::default(), InMemoryFormat::Binary);
    }
}
