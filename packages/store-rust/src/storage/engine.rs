//! Low-level storage engine trait and cursor-based iteration types.
//!
//! Defines [`StorageEngine`], the innermost storage layer. Implementations
//! own every [`Record`] of one (map, partition) pair and keep the entry cost
//! estimate in step with each structural change.

use mapstore_core::Data;

use super::cost::EntryCostEstimator;
use super::record::{Record, RecordValue};

/// Opaque cursor for resumable iteration over storage entries.
///
/// Implementations encode their internal position in the `state` field.
/// Consumers should treat `state` as opaque and only check `finished`.
#[derive(Debug, Clone)]
pub struct IterationCursor {
    /// Opaque state for the storage implementation to resume iteration.
    pub state: Vec<u8>,
    /// Whether iteration has completed (no more entries).
    pub finished: bool,
}

impl IterationCursor {
    /// Creates a cursor positioned at the beginning of the storage.
    #[must_use]
    pub fn start() -> Self {
        Self {
            state: Vec::new(),
            finished: false,
        }
    }
}

/// Result of a cursor-based fetch operation.
#[derive(Debug)]
pub struct FetchResult<T> {
    /// The fetched items.
    pub items: Vec<T>,
    /// Updated cursor for the next fetch call.
    pub next_cursor: IterationCursor,
}

/// Per-partition key/record container.
///
/// Mutating methods take `&mut self`: a storage is owned by exactly one
/// record store, which in turn is driven by a single partition thread.
/// The trait is `Send` so a store can move onto its partition worker, but
/// deliberately not `Sync`.
pub trait StorageEngine: Send {
    /// Inserts or replaces a record. Returns the previous record if any.
    fn put(&mut self, key: Data, record: Record) -> Option<Record>;

    /// Inserts or replaces a record and borrows the stored copy.
    fn insert(&mut self, key: Data, record: Record) -> &mut Record;

    /// Commits `record` holding `value` under `key`, replacing what was
    /// stored. `value` must already be in the map's in-memory format.
    /// Returns the superseded record.
    fn update_record_value(&mut self, key: &Data, record: Record, value: RecordValue)
        -> Option<Record>;

    /// Borrows a record.
    fn get(&self, key: &Data) -> Option<&Record>;

    /// Mutably borrows a record for metadata-only changes (value changes go
    /// through [`update_record_value`](Self::update_record_value)).
    fn get_mut(&mut self, key: &Data) -> Option<&mut Record>;

    /// Removes a record by key, returning it.
    fn remove(&mut self, key: &Data) -> Option<Record>;

    /// Checks if a key exists.
    fn contains_key(&self, key: &Data) -> bool;

    /// Returns the number of entries.
    fn len(&self) -> usize;

    /// Checks if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Removes every entry, returning them.
    fn clear(&mut self) -> Vec<Record>;

    /// Destroys the storage, releasing all resources including deferred blocks.
    fn destroy(&mut self);

    /// Iterates all entries in storage order.
    fn iter(&self) -> Box<dyn Iterator<Item = (&Data, &Record)> + '_>;

    /// The running cost estimator.
    fn entry_cost_estimator(&self) -> &EntryCostEstimator;

    /// Replaces the cost estimator, seeding it with the current entries.
    fn set_entry_cost_estimator(&mut self, estimator: EntryCostEstimator);

    /// Releases value blocks parked by earlier removes and replaces.
    fn dispose_deferred_blocks(&mut self);

    /// Number of value blocks waiting for [`dispose_deferred_blocks`](Self::dispose_deferred_blocks).
    fn deferred_block_count(&self) -> usize;

    /// Fetches at most `size` keys starting from `cursor`.
    fn fetch_keys(&self, cursor: &IterationCursor, size: usize) -> FetchResult<Data>;

    /// Fetches at most `size` entries (key + record) starting from `cursor`.
    fn fetch_entries(&self, cursor: &IterationCursor, size: usize) -> FetchResult<(Data, Record)>;

    /// Returns `sample_count` random entries for eviction sampling.
    fn random_samples(&self, sample_count: usize) -> Vec<(Data, Record)>;
}
