//! Write-behind [`MapDataStore`]: mutations are queued and written to the
//! external store in batches once their delay has passed.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use mapstore_core::Data;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::MapStoreConfig;
use crate::storage::map_data_store::MapDataStore;
use crate::storage::map_store::MapStore;
use crate::storage::record::RecordValue;

/// One queued mutation. `value == None` is a delete.
#[derive(Debug, Clone)]
struct DelayedEntry {
    key: Data,
    value: Option<RecordValue>,
    store_time: i64,
    sequence: u64,
    txn_id: Option<Uuid>,
}

#[derive(Default)]
struct WriteBehindQueue {
    entries: VecDeque<DelayedEntry>,
    last_sequence: u64,
    flush_sequence: u64,
}

/// Delayed, batched delivery to a [`MapStore`].
///
/// With coalescing on, a key has at most one queued entry: a newer write or
/// delete replaces the queued one. Reads of queued keys are answered from
/// the queue so callers see their own writes before they are flushed.
/// Write-behind stores never post-process.
pub struct WriteBehindDataStore {
    store: Arc<dyn MapStore>,
    write_delay_millis: i64,
    batch_size: usize,
    coalescing: bool,
    queue: Mutex<WriteBehindQueue>,
}

impl WriteBehindDataStore {
    /// Creates an empty queue in front of `store`, using the delay, batch
    /// size and coalescing settings of `config`.
    #[must_use]
    pub fn new(store: Arc<dyn MapStore>, config: &MapStoreConfig) -> Self {
        let write_delay_millis = i64::try_from(config.write_delay_seconds.saturating_mul(1000))
            .unwrap_or(i64::MAX);
        Self {
            store,
            write_delay_millis,
            batch_size: config.write_batch_size.max(1),
            coalescing: config.write_coalescing,
            queue: Mutex::new(WriteBehindQueue::default()),
        }
    }

    fn enqueue(&self, key: &Data, value: Option<RecordValue>, now: i64, txn_id: Option<Uuid>) {
        let mut queue = self.queue.lock();
        if self.coalescing {
            queue.entries.retain(|e| e.key != *key);
        }
        queue.last_sequence += 1;
        let sequence = queue.last_sequence;
        queue.entries.push_back(DelayedEntry {
            key: key.clone(),
            value,
            store_time: now.saturating_add(self.write_delay_millis),
            sequence,
            txn_id,
        });
    }

    /// Writes every entry whose delay has passed at `now`, plus everything
    /// covered by an earlier [`soft_flush`](MapDataStore::soft_flush).
    ///
    /// Returns the number of entries written.
    ///
    /// # Errors
    ///
    /// Returns the external store's error; unwritten entries stay queued.
    async fn run_due(&self, now: i64) -> anyhow::Result<usize> {
        let due: VecDeque<DelayedEntry> = {
            let mut queue = self.queue.lock();
            let flush_sequence = queue.flush_sequence;
            let (due, pending): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut queue.entries)
                .into_iter()
                .partition(|e| e.store_time <= now || e.sequence <= flush_sequence);
            queue.entries = pending;
            due
        };
        self.write_batches(due).await
    }

    /// Transaction ids of the queued entries, oldest first.
    #[must_use]
    pub fn queued_transactions(&self) -> Vec<Option<Uuid>> {
        self.queue.lock().entries.iter().map(|e| e.txn_id).collect()
    }

    async fn write_batches(&self, mut remaining: VecDeque<DelayedEntry>) -> anyhow::Result<usize> {
        let mut written = 0;
        while let Some(first) = remaining.front() {
            let is_delete = first.value.is_none();
            let run = remaining
                .iter()
                .take(self.batch_size)
                .take_while(|e| e.value.is_none() == is_delete)
                .count();

            let result = if is_delete {
                let keys: Vec<Data> = remaining.iter().take(run).map(|e| e.key.clone()).collect();
                self.store.delete_all(&keys).await
            } else {
                let batch: Vec<(Data, RecordValue)> = remaining
                    .iter()
                    .take(run)
                    .filter_map(|e| e.value.clone().map(|v| (e.key.clone(), v)))
                    .collect();
                self.store.store_all(&batch).await
            };

            if let Err(error) = result {
                tracing::warn!(pending = remaining.len(), %error, "write-behind flush failed");
                self.requeue(remaining);
                return Err(error);
            }
            remaining.drain(..run);
            written += run;
        }
        if written > 0 {
            tracing::debug!(written, "write-behind entries flushed");
        }
        Ok(written)
    }

    fn requeue(&self, failed: VecDeque<DelayedEntry>) {
        let mut queue = self.queue.lock();
        for entry in failed.into_iter().rev() {
            // A newer entry for the key was queued while this batch was in flight.
            if self.coalescing && queue.entries.iter().any(|e| e.key == entry.key) {
                continue;
            }
            queue.entries.push_front(entry);
        }
    }
}

#[async_trait]
impl MapDataStore for WriteBehindDataStore {
    async fn add(
        &self,
        key: &Data,
        value: &RecordValue,
        _expiration_time: i64,
        now: i64,
        txn_id: Option<Uuid>,
    ) -> anyhow::Result<RecordValue> {
        self.enqueue(key, Some(value.clone()), now, txn_id);
        Ok(value.clone())
    }

    async fn remove(&self, key: &Data, now: i64, txn_id: Option<Uuid>) -> anyhow::Result<()> {
        self.enqueue(key, None, now, txn_id);
        Ok(())
    }

    async fn load(&self, key: &Data) -> anyhow::Result<Option<RecordValue>> {
        let queued = {
            let queue = self.queue.lock();
            queue
                .entries
                .iter()
                .rev()
                .find(|e| e.key == *key)
                .map(|e| e.value.clone())
        };
        match queued {
            Some(value) => Ok(value),
            None => self.store.load(key).await,
        }
    }

    async fn load_all(&self, keys: &[Data]) -> anyhow::Result<Vec<(Data, RecordValue)>> {
        let mut loaded = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.load(key).await? {
                loaded.push((key.clone(), value));
            }
        }
        Ok(loaded)
    }

    async fn remove_all(&self, keys: &[Data], now: i64) -> anyhow::Result<()> {
        for key in keys {
            self.enqueue(key, None, now, None);
        }
        Ok(())
    }

    fn is_loadable(&self, key: &Data) -> bool {
        !self.queue.lock().entries.iter().any(|e| e.key == *key)
    }

    fn pending_operation_count(&self) -> u64 {
        self.queue.lock().entries.len() as u64
    }

    async fn soft_flush(&self) -> anyhow::Result<u64> {
        let mut queue = self.queue.lock();
        let last = queue.entries.back().map_or(0, |e| e.sequence);
        queue.flush_sequence = queue.flush_sequence.max(last);
        Ok(last)
    }

    async fn hard_flush(&self) -> anyhow::Result<()> {
        let all = std::mem::take(&mut self.queue.lock().entries);
        self.write_batches(all).await?;
        Ok(())
    }

    async fn flush_due(&self, now: i64) -> anyhow::Result<usize> {
        self.run_due(now).await
    }

    fn reset(&self) {
        *self.queue.lock() = WriteBehindQueue::default();
    }

    fn is_write_behind(&self) -> bool {
        true
    }
}
