//! Persistence adapter between a record store and its external store.
//!
//! Defines [`MapDataStore`], the abstraction over write-through and
//! write-behind persistence strategies. The [`RecordStore`](super::RecordStore)
//! calls `add()` / `remove()` on every mutation that must be persisted; the
//! implementation decides when and how the data actually reaches the
//! [`MapStore`](super::MapStore).

use async_trait::async_trait;
use mapstore_core::Data;
use uuid::Uuid;

use super::record::RecordValue;

/// Persistence adapter for one (map, partition).
///
/// Used as `Arc<dyn MapDataStore>`.
#[async_trait]
pub trait MapDataStore: Send + Sync {
    /// Persists a value (or queues it for later persistence).
    ///
    /// `expiration_time` is the record's absolute expiration time.
    /// `txn_id` ties the write to a transaction when there is one.
    ///
    /// Returns the value the external store hands back. Callers must only
    /// use it when [`is_post_processing`](Self::is_post_processing) is true.
    async fn add(
        &self,
        key: &Data,
        value: &RecordValue,
        expiration_time: i64,
        now: i64,
        txn_id: Option<Uuid>,
    ) -> anyhow::Result<RecordValue>;

    /// Removes a key from the backing store (or queues the removal).
    async fn remove(&self, key: &Data, now: i64, txn_id: Option<Uuid>) -> anyhow::Result<()>;

    /// Loads a single value from the backing store.
    ///
    /// Returns `None` if the key does not exist.
    async fn load(&self, key: &Data) -> anyhow::Result<Option<RecordValue>>;

    /// Loads multiple values from the backing store, skipping missing keys.
    async fn load_all(&self, keys: &[Data]) -> anyhow::Result<Vec<(Data, RecordValue)>>;

    /// Removes all specified keys from the backing store.
    async fn remove_all(&self, keys: &[Data], now: i64) -> anyhow::Result<()>;

    /// Whether a key is safe to load (not queued for write-behind).
    ///
    /// For write-through implementations, always returns `true`.
    fn is_loadable(&self, key: &Data) -> bool;

    /// Number of pending (not yet flushed) operations.
    ///
    /// For write-through, always returns 0.
    fn pending_operation_count(&self) -> u64;

    /// Marks everything queued so far as flushable.
    ///
    /// Returns the sequence number of the last queued operation, or 0 if empty.
    async fn soft_flush(&self) -> anyhow::Result<u64>;

    /// Flushes all pending writes immediately in the calling task.
    async fn hard_flush(&self) -> anyhow::Result<()>;

    /// Writes the pending operations that are due at `now`: those whose
    /// delay has passed and those covered by an earlier
    /// [`soft_flush`](Self::soft_flush).
    ///
    /// Returns the number of operations written. Synchronous stores never
    /// hold anything back and return 0.
    async fn flush_due(&self, _now: i64) -> anyhow::Result<usize> {
        Ok(0)
    }

    /// Resets the data store to its initial state (drops queues, etc.).
    fn reset(&self);

    /// Whether the value returned from [`add`](Self::add) replaces the
    /// in-memory value.
    fn is_post_processing(&self) -> bool {
        false
    }

    /// Whether writes are delayed and batched.
    fn is_write_behind(&self) -> bool {
        false
    }

    /// Whether this is the no-op implementation.
    fn is_null(&self) -> bool {
        false
    }
}
