//! Conversion between [`Value`] and its serialized [`Data`] form.
//!
//! The record store only ever talks to the [`SerializationService`] trait.
//! [`MsgPackSerializationService`] is the default implementation and encodes
//! with `rmp-serde` using named fields.

use anyhow::Context;

use crate::types::{Data, Value};

/// Converts values between their object and serialized representations.
///
/// Used as `Arc<dyn SerializationService>`.
pub trait SerializationService: Send + Sync {
    /// Serializes a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded.
    fn to_data(&self, value: &Value) -> anyhow::Result<Data>;

    /// Deserializes a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid encoding of a [`Value`].
    fn to_object(&self, data: &Data) -> anyhow::Result<Value>;
}

/// `MsgPack` codec backed by `rmp-serde`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackSerializationService;

impl SerializationService for MsgPackSerializationService {
    fn to_data(&self, value: &Value) -> anyhow::Result<Data> {
        let bytes = rmp_serde::to_vec_named(value).context("failed to encode value as MsgPack")?;
        Ok(Data::from(bytes))
    }

    fn to_object(&self, data: &Data) -> anyhow::Result<Value> {
        rmp_serde::from_slice(data.as_bytes()).context("failed to decode MsgPack value")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn nested_value_survives_encoding() {
        let codec = MsgPackSerializationService;
        let mut fields = BTreeMap::new();
        fields.insert("amt".to_string(), Value::Int(10));
        fields.insert("blob".to_string(), Value::Bytes(vec![1, 2, 3]));
        let value = Value::Map(fields);

        let data = codec.to_data(&value).unwrap();
        assert!(!data.is_empty());
        assert_eq!(codec.to_object(&data).unwrap(), value);
    }

    #[test]
    fn equal_values_encode_to_equal_data() {
        let codec = MsgPackSerializationService;
        let a = codec.to_data(&Value::from("o1")).unwrap();
        let b = codec.to_data(&Value::from("o1")).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        /// Keys are compared by their bytes, so encoding must be deterministic.
        #[test]
        fn encoding_is_deterministic(
            fields in proptest::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8),
        ) {
            let codec = MsgPackSerializationService;
            let value = Value::Map(fields.into_iter().map(|(k, v)| (k, Value::Int(v))).collect());
            let first = codec.to_data(&value).unwrap();
            prop_assert_eq!(&first, &codec.to_data(&value).unwrap());
            prop_assert_eq!(codec.to_object(&first).unwrap(), value);
        }
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let codec = MsgPackSerializationService;
        let err = codec.to_object(&Data::from(vec![0xc1])).unwrap_err();
        assert!(err.to_string().contains("MsgPack"));
    }
}
