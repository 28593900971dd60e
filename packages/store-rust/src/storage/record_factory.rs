//! Creates records and converts values into a map's in-memory format.

use std::sync::Arc;

use mapstore_core::{Data, InMemoryFormat, SerializationService};

use crate::storage::record::{NativeBlock, Record, RecordValue};

/// Builds [`Record`]s whose values are held in one [`InMemoryFormat`].
///
/// Callers may hand in values in any representation; the factory converts
/// them with the [`SerializationService`] before they reach a record.
#[derive(Clone)]
pub struct RecordFactory {
    format: InMemoryFormat,
    serialization: Arc<dyn SerializationService>,
}

impl RecordFactory {
    /// Creates a factory for the given format.
    #[must_use]
    pub fn new(format: InMemoryFormat, serialization: Arc<dyn SerializationService>) -> Self {
        Self {
            format,
            serialization,
        }
    }

    /// The format produced by this factory.
    #[must_use]
    pub fn format(&self) -> InMemoryFormat {
        self.format
    }

    /// Creates a record stamped at `now` holding `value` in this factory's format.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted.
    pub fn new_record(&self, key: Data, value: RecordValue, now: i64) -> anyhow::Result<Record> {
        Ok(Record::new(key, self.to_format(value)?, now))
    }

    /// Replaces the record's value, converting it first.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted; the record is left unchanged.
    pub fn set_value(&self, record: &mut Record, value: RecordValue) -> anyhow::Result<()> {
        record.value = self.to_format(value)?;
        Ok(())
    }

    /// Converts a value into this factory's format. Values already in the
    /// right format pass through untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or deserialization fails.
    pub fn to_format(&self, value: RecordValue) -> anyhow::Result<RecordValue> {
        let converted = match (self.format, value) {
            (InMemoryFormat::Binary, RecordValue::Object(v)) => {
                RecordValue::Binary(self.serialization.to_data(&v)?)
            }
            (InMemoryFormat::Binary, RecordValue::Native(block)) => {
                RecordValue::Binary(block.to_data())
            }
            (InMemoryFormat::Object, RecordValue::Binary(data)) => {
                RecordValue::Object(self.serialization.to_object(&data)?)
            }
            (InMemoryFormat::Object, RecordValue::Native(block)) => {
                RecordValue::Object(self.serialization.to_object(&block.to_data())?)
            }
            (InMemoryFormat::Native, RecordValue::Binary(data)) => {
                RecordValue::Native(NativeBlock::new(data.to_bytes()))
            }
            (InMemoryFormat::Native, RecordValue::Object(v)) => {
                RecordValue::Native(NativeBlock::new(self.serialization.to_data(&v)?.to_bytes()))
            }
            (_, same) => same,
        };
        Ok(converted)
    }
}
