//! Per-map-per-partition record store trait.
//!
//! Defines [`RecordStore`], the primary interface that operation handlers
//! interact with. It orchestrates the [`StorageEngine`](super::StorageEngine),
//! the [`MapDataStore`](super::MapDataStore), mutation observers, indexes,
//! the lock store and statistics for one partition of one map.

use std::sync::Arc;

use async_trait::async_trait;
use mapstore_core::Data;
use uuid::Uuid;

use super::engine::{FetchResult, IterationCursor, StorageEngine};
use super::error::Result;
use super::expiry::{ExpiryPolicy, ExpiryReason};
use super::map_data_store::MapDataStore;
use super::record::{Record, RecordValue};
use super::stats::LocalRecordStoreStats;
use crate::config::MapConfig;

/// Origin of a write operation, used to decide whether it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerProvenance {
    /// Originated in this cluster.
    NotWan,
    /// Replicated from a remote cluster over WAN.
    Wan,
}

/// Per-map-per-partition record store.
///
/// A record store is owned by the single worker that runs its partition.
/// Every mutating method takes `&mut self`, and implementations are `Send`
/// but not `Sync`: the store can move to its partition worker but can never
/// be shared between threads.
///
/// Used as `Box<dyn RecordStore>`.
#[async_trait]
pub trait RecordStore: Send {
    /// Name of the map this record store manages.
    fn name(&self) -> &str;

    /// Partition ID this record store belongs to.
    fn partition_id(&self) -> u32;

    /// The map's configuration.
    fn config(&self) -> &MapConfig;

    // --- Record primitives ---

    /// Builds a record stamped at `now` with its expiration resolved against
    /// the map defaults. Counts as a put in the statistics (update time only).
    /// Does not touch storage.
    fn create_record(
        &mut self,
        key: &Data,
        value: RecordValue,
        expiry: &ExpiryPolicy,
        now: i64,
    ) -> Result<Record>;

    /// Creates a record, persists it, inserts it and notifies observers.
    ///
    /// A post-processing data store's returned value replaces the record's
    /// value. On persistence failure nothing is inserted.
    async fn put_new_record(
        &mut self,
        key: Data,
        value: RecordValue,
        expiry: ExpiryPolicy,
        now: i64,
        txn_id: Option<Uuid>,
    ) -> Result<Record>;

    /// Applies a new value to an existing record: statistics, update and
    /// access hooks, expiration, optional persistence, observers, and
    /// finally the storage write. Returns the committed record.
    ///
    /// On persistence failure the stored record is left as it was.
    #[allow(clippy::too_many_arguments)]
    async fn update_record(
        &mut self,
        key: &Data,
        record: Record,
        value: RecordValue,
        now: i64,
        count_as_access: bool,
        expiry: ExpiryPolicy,
        is_map_store_operation: bool,
        txn_id: Option<Uuid>,
    ) -> Result<Record>;

    /// Whether writes with `provenance` are persisted to the data store.
    fn persistence_enabled_for(&self, provenance: CallerProvenance) -> bool;

    // --- Index integration ---

    /// Pushes a committed record into the indexes; `old_value` is what it replaced.
    fn save_index(&self, record: &Record, old_value: Option<&RecordValue>);

    /// Removes a record from the indexes.
    fn remove_index(&self, record: &Record);

    /// Removes many records from the indexes. No index calls at all when the
    /// partition has no index.
    fn remove_indexes(&self, records: &[Record]);

    // --- Reporting ---

    /// Current memory estimate of all entries.
    fn owned_entry_cost(&self) -> u64;

    /// Shared statistics handle.
    fn local_record_store_stats(&self) -> Arc<LocalRecordStoreStats>;

    /// Number of locked keys.
    ///
    /// Fails with [`LockSupportDisabled`](super::RecordStoreError::LockSupportDisabled)
    /// when the store was initialized without a lock service.
    fn locked_entry_count(&self) -> Result<usize>;

    /// Releases value blocks the storage parked on remove and replace.
    fn dispose_deferred_blocks(&mut self);

    // --- Core CRUD ---

    /// Reads a value, loading it from the data store on a miss.
    ///
    /// With `touch`, the read counts as an access. Expired records are
    /// evicted and reported as missing.
    async fn get(&mut self, key: &Data, touch: bool) -> Result<Option<RecordValue>>;

    /// Reads many values, loading the loadable misses in one batch.
    /// Missing keys are skipped.
    async fn get_all(&mut self, keys: &[Data]) -> Result<Vec<(Data, RecordValue)>>;

    /// Whether `key` is in memory (never loads).
    fn exists_in_memory(&self, key: &Data) -> bool;

    /// Writes a value and returns the one it replaced.
    async fn put(
        &mut self,
        key: Data,
        value: RecordValue,
        expiry: ExpiryPolicy,
        provenance: CallerProvenance,
    ) -> Result<Option<RecordValue>>;

    /// Removes a key and returns its value.
    async fn remove(
        &mut self,
        key: &Data,
        provenance: CallerProvenance,
    ) -> Result<Option<RecordValue>>;

    /// Installs a record received from another replica, keeping its
    /// metadata and crediting its hits. Never persisted.
    fn put_replicated_record(&mut self, record: Record) -> Result<()>;

    // --- Iteration ---

    /// Fetch keys with cursor-based pagination.
    fn fetch_keys(&self, cursor: &IterationCursor, size: usize) -> FetchResult<Data>;

    /// Fetch entries with cursor-based pagination.
    fn fetch_entries(&self, cursor: &IterationCursor, size: usize) -> FetchResult<(Data, Record)>;

    /// Iterate all records with an object-safe consumer.
    ///
    /// Calls `consumer` for each non-expired entry. Uses `&mut dyn FnMut`
    /// instead of generic `F: FnMut` for `Box<dyn RecordStore>` compatibility.
    fn for_each_boxed(&self, consumer: &mut dyn FnMut(&Data, &Record));

    /// Random entries for eviction sampling.
    fn random_samples(&self, sample_count: usize) -> Vec<(Data, Record)>;

    // --- Size ---

    /// Number of entries in the record store.
    fn size(&self) -> usize;

    /// Whether the record store is empty.
    fn is_empty(&self) -> bool;

    // --- Expiry ---

    /// Checks if a record has expired.
    fn has_expired(&self, key: &Data, now: i64) -> ExpiryReason;

    /// Removes expired entries, examining at most `percentage` percent of
    /// the entries. Returns how many were removed.
    fn evict_expired(&mut self, percentage: u32, now: i64) -> Result<usize>;

    /// Whether this record store has any entries that can expire.
    fn is_expirable(&self) -> bool;

    // --- Eviction ---

    /// Drops an entry from memory only; the data store is not touched.
    fn evict(&mut self, key: &Data) -> Result<Option<RecordValue>>;

    /// Evicts every entry whose key is not locked. Returns the number evicted.
    fn evict_all(&mut self) -> Result<usize>;

    /// Whether the entry count has reached the configured maximum.
    fn should_evict(&self) -> bool;

    // --- Lifecycle ---

    /// Initializes the record store: registers observers and creates the
    /// lock store.
    fn init(&mut self);

    /// Removes every unlocked entry, deleting them from the data store as
    /// well. Returns the number of entries removed.
    async fn clear(&mut self) -> Result<usize>;

    /// Drops all in-memory state without touching the data store contents.
    fn reset(&mut self);

    /// Destroys the record store and releases all resources.
    fn destroy(&mut self);

    // --- MapDataStore integration ---

    /// Marks pending writes for flushing.
    ///
    /// Returns the sequence number of the last queued operation.
    async fn soft_flush(&mut self) -> Result<u64>;

    /// Writes everything pending to the external store now.
    async fn hard_flush(&mut self) -> Result<()>;

    /// Writes the pending operations that are due at `now`. Returns how many
    /// were written.
    async fn flush_due(&mut self, now: i64) -> Result<usize>;

    /// Access the underlying `StorageEngine`.
    fn storage(&self) -> &dyn StorageEngine;

    /// Access the underlying `MapDataStore`.
    fn map_data_store(&self) -> &dyn MapDataStore;
}
