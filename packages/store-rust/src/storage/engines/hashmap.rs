//! In-memory [`StorageEngine`] implementation backed by an `ahash` [`HashMap`].
//!
//! No internal locking: the owning record store is the only caller and it
//! runs on its partition thread.

use std::collections::HashMap;

use ahash::RandomState;
use mapstore_core::Data;
use rand::Rng;

use crate::storage::cost::{signed, EntryCostEstimator};
use crate::storage::engine::{FetchResult, IterationCursor, StorageEngine};
use crate::storage::record::{NativeBlock, Record, RecordValue};

/// In-memory storage for one (map, partition).
///
/// Every insert, replace and remove adjusts the [`EntryCostEstimator`] in
/// the same call, so the estimate never lags behind the map contents.
/// Native value blocks released by those operations are parked until
/// [`dispose_deferred_blocks`](StorageEngine::dispose_deferred_blocks).
pub struct HashMapStorage {
    entries: HashMap<Data, Record, RandomState>,
    estimator: EntryCostEstimator,
    deferred_blocks: Vec<NativeBlock>,
}

impl HashMapStorage {
    /// Creates a new, empty storage using `estimator` for cost accounting.
    #[must_use]
    pub fn new(estimator: EntryCostEstimator) -> Self {
        Self {
            entries: HashMap::default(),
            estimator,
            deferred_blocks: Vec::new(),
        }
    }

    fn release(&mut self, record: &Record) {
        self.estimator
            .adjust_estimate_by(-signed(self.estimator.calculate_entry_cost(record.key(), record)));
        self.defer_value(&record.value);
    }

    fn defer_value(&mut self, value: &RecordValue) {
        if let RecordValue::Native(block) = value {
            self.deferred_blocks.push(block.clone());
        }
    }

    fn snapshot_keys(&self) -> Vec<&Data> {
        self.entries.keys().collect()
    }
}

/// Decodes a cursor's opaque state into a `u64` offset.
///
/// Empty state (from `IterationCursor::start()`) is treated as offset 0.
fn decode_cursor_offset(cursor: &IterationCursor) -> u64 {
    if cursor.state.is_empty() {
        0
    } else {
        let mut buf = [0u8; 8];
        let len = cursor.state.len().min(8);
        buf[..len].copy_from_slice(&cursor.state[..len]);
        u64::from_le_bytes(buf)
    }
}

/// Encodes an offset into cursor state bytes (little-endian `u64`).
fn encode_cursor_offset(offset: u64) -> Vec<u8> {
    offset.to_le_bytes().to_vec()
}

impl StorageEngine for HashMapStorage {
    fn put(&mut self, key: Data, record: Record) -> Option<Record> {
        self.estimator
            .adjust_estimate_by(signed(self.estimator.calculate_entry_cost(&key, &record)));
        let previous = self.entries.insert(key, record);
        if let Some(old) = &previous {
            self.release(old);
        }
        previous
    }

    fn insert(&mut self, key: Data, record: Record) -> &mut Record {
        if let Some(old) = self.entries.remove(&key) {
            self.release(&old);
        }
        self.estimator
            .adjust_estimate_by(signed(self.estimator.calculate_entry_cost(&key, &record)));
        self.entries.entry(key).or_insert(record)
    }

    fn update_record_value(
        &mut self,
        key: &Data,
        mut record: Record,
        value: RecordValue,
    ) -> Option<Record> {
        record.value = value;
        self.put(key.clone(), record)
    }

    fn get(&self, key: &Data) -> Option<&Record> {
        self.entries.get(key)
    }

    fn get_mut(&mut self, key: &Data) -> Option<&mut Record> {
        self.entries.get_mut(key)
    }

    fn remove(&mut self, key: &Data) -> Option<Record> {
        let removed = self.entries.remove(key);
        if let Some(record) = &removed {
            self.release(record);
        }
        removed
    }

    fn contains_key(&self, key: &Data) -> bool {
        self.entries.contains_key(key)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn clear(&mut self) -> Vec<Record> {
        let records: Vec<Record> = self.entries.drain().map(|(_, r)| r).collect();
        for record in &records {
            self.defer_value(&record.value);
        }
        self.estimator.reset();
        records
    }

    fn destroy(&mut self) {
        self.clear();
        self.dispose_deferred_blocks();
        self.entries.shrink_to_fit();
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&Data, &Record)> + '_> {
        Box::new(self.entries.iter())
    }

    fn entry_cost_estimator(&self) -> &EntryCostEstimator {
        &self.estimator
    }

    fn set_entry_cost_estimator(&mut self, estimator: EntryCostEstimator) {
        estimator.reset();
        for (key, record) in &self.entries {
            estimator.adjust_estimate_by(signed(estimator.calculate_entry_cost(key, record)));
        }
        self.estimator = estimator;
    }

    fn dispose_deferred_blocks(&mut self) {
        self.deferred_blocks.clear();
    }

    fn deferred_block_count(&self) -> usize {
        self.deferred_blocks.len()
    }

    fn fetch_keys(&self, cursor: &IterationCursor, size: usize) -> FetchResult<Data> {
        let snapshot = self.snapshot_keys();
        let total = snapshot.len();
        // Cursor offsets are always small (bounded by storage size), so truncation is safe.
        #[allow(clippy::cast_possible_truncation)]
        let offset = decode_cursor_offset(cursor) as usize;

        let items: Vec<Data> = snapshot
            .into_iter()
            .skip(offset)
            .take(size)
            .cloned()
            .collect();

        let new_offset = offset + items.len();
        FetchResult {
            items,
            next_cursor: IterationCursor {
                state: encode_cursor_offset(new_offset as u64),
                finished: new_offset >= total,
            },
        }
    }

    fn fetch_entries(&self, cursor: &IterationCursor, size: usize) -> FetchResult<(Data, Record)> {
        let total = self.entries.len();
        #[allow(clippy::cast_possible_truncation)]
        let offset = decode_cursor_offset(cursor) as usize;

        let items: Vec<(Data, Record)> = self
            .entries
            .iter()
            .skip(offset)
            .take(size)
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect();

        let new_offset = offset + items.len();
        FetchResult {
            items,
            next_cursor: IterationCursor {
                state: encode_cursor_offset(new_offset as u64),
                finished: new_offset >= total,
            },
        }
    }

    fn random_samples(&self, sample_count: usize) -> Vec<(Data, Record)> {
        if sample_count == 0 {
            return Vec::new();
        }

        let mut rng = rand::rng();
        let mut reservoir: Vec<(&Data, &Record)> = Vec::with_capacity(sample_count);

        for (i, entry) in self.entries.iter().enumerate() {
            if i < sample_count {
                reservoir.push(entry);
            } else {
                // Replace an existing sample with probability sample_count / (i + 1)
                let j = rng.random_range(0..=i);
                if j < sample_count {
                    reservoir[j] = entry;
                }
            }
        }

        reservoir
            .into_iter()
            .map(|(k, r)| (k.clone(), r.clone()))
            .collect()
    }
}
