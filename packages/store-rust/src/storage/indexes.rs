//! Contract between a record store and the secondary indexes of its map.
//!
//! Index implementations live elsewhere; the record store only hands them
//! [`QueryableEntry`] views on write and the removed key and value on delete.

use std::sync::Arc;

use mapstore_core::Data;

use super::record::{Record, RecordValue};

/// Who triggered an index change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationSource {
    /// A user-level map operation.
    User,
    /// Internal maintenance such as migration or replication.
    System,
}

/// Gives index implementations access back to the owning store.
pub trait StoreAdapter: Send + Sync {
    /// Name of the map the store belongs to.
    fn map_name(&self) -> &str;
    /// Partition the store owns.
    fn partition_id(&self) -> u32;
}

/// [`StoreAdapter`] describing one record store.
#[derive(Debug, Clone)]
pub struct RecordStoreAdapter {
    map_name: String,
    partition_id: u32,
}

impl RecordStoreAdapter {
    /// Creates the adapter for `map_name`'s partition `partition_id`.
    #[must_use]
    pub fn new(map_name: impl Into<String>, partition_id: u32) -> Self {
        Self {
            map_name: map_name.into(),
            partition_id,
        }
    }
}

impl StoreAdapter for RecordStoreAdapter {
    fn map_name(&self) -> &str {
        &self.map_name
    }

    fn partition_id(&self) -> u32 {
        self.partition_id
    }
}

/// Borrowed view of an entry handed to the indexes.
pub struct QueryableEntry<'a> {
    pub key: &'a Data,
    pub value: &'a RecordValue,
    pub record: &'a Record,
    pub store_adapter: &'a dyn StoreAdapter,
}

/// The indexes defined on one map partition.
///
/// Used as `Arc<dyn Indexes>`.
pub trait Indexes: Send + Sync {
    fn have_at_least_one_index(&self) -> bool;

    /// Adds or replaces the entry. `old_value` is the value being replaced.
    fn put_entry(
        &self,
        entry: &QueryableEntry<'_>,
        old_value: Option<&RecordValue>,
        source: OperationSource,
    );

    /// Drops the entry for `key` whose current value is `value`.
    fn remove_entry(&self, key: &Data, value: &RecordValue, source: OperationSource);
}

/// Resolves the [`Indexes`] of a (map, partition).
pub trait IndexProvider: Send + Sync {
    fn indexes_for(&self, map: &str, partition_id: u32) -> Arc<dyn Indexes>;
}

/// Index set and provider for maps without indexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIndexes;

impl Indexes for NoIndexes {
    fn have_at_least_one_index(&self) -> bool {
        false
    }

    fn put_entry(&self, _: &QueryableEntry<'_>, _: Option<&RecordValue>, _: OperationSource) {}

    fn remove_entry(&self, _: &Data, _: &RecordValue, _: OperationSource) {}
}

impl IndexProvider for NoIndexes {
    fn indexes_for(&self, _map: &str, _partition_id: u32) -> Arc<dyn Indexes> {
        Arc::new(Self)
    }
}
