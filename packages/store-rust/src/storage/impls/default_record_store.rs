//! Per-map-per-partition record store that orchestrates all storage layers.
//!
//! [`DefaultRecordStore`] coordinates the in-memory
//! [`StorageEngine`](crate::storage::StorageEngine) with the
//! [`MapDataStore`](crate::storage::MapDataStore), and keeps the mutation
//! observers, indexes, lock store and statistics of its partition in step
//! with every write.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use mapstore_core::{ClockSource, Data, InMemoryFormat};
use uuid::Uuid;

use crate::config::{MapConfig, MetadataPolicy};
use crate::storage::cost::EntryCostEstimator;
use crate::storage::engine::{FetchResult, IterationCursor, StorageEngine};
use crate::storage::error::{RecordStoreError, Result};
use crate::storage::expiry::{
    has_expired as expiry_reason, set_expiration_times, ExpiryPolicy, ExpiryReason,
};
use crate::storage::factory::StoreServices;
use crate::storage::indexes::{Indexes, OperationSource, QueryableEntry, RecordStoreAdapter};
use crate::storage::lock_store::{LockStore, ObjectNamespace};
use crate::storage::map_data_store::MapDataStore;
use crate::storage::mutation_observer::{
    CompositeMutationObserver, EventJournalObserver, MetadataObserver, MutationObserver,
};
use crate::storage::record::{Record, RecordValue, NO_EXPIRY};
use crate::storage::record_factory::RecordFactory;
use crate::storage::record_store::{CallerProvenance, RecordStore};
use crate::storage::stats::LocalRecordStoreStats;

/// Per-map-per-partition record store.
///
/// Coordinates:
/// - [`StorageEngine`]: in-memory key/record storage
/// - [`MapDataStore`]: external persistence, write-through or write-behind
/// - [`CompositeMutationObserver`]: event journal and structured metadata
/// - [`Indexes`]: secondary indexes of the map on this partition
///
/// Owned by its partition worker: `Send`, never `Sync`.
pub struct DefaultRecordStore {
    name: String,
    partition_id: u32,
    config: Arc<MapConfig>,
    record_factory: RecordFactory,
    storage: Box<dyn StorageEngine>,
    data_store: Arc<dyn MapDataStore>,
    mutation_observer: CompositeMutationObserver,
    indexes: Arc<dyn Indexes>,
    store_adapter: RecordStoreAdapter,
    services: StoreServices,
    lock_store: Option<Arc<dyn LockStore>>,
    stats: Arc<LocalRecordStoreStats>,
    clock: Arc<dyn ClockSource>,
    expirable: bool,
    initialized: bool,
    _not_sync: PhantomData<Cell<()>>,
}

impl DefaultRecordStore {
    /// Creates a record store over `storage` and `data_store`.
    ///
    /// Observers and the lock store are attached by [`init`](RecordStore::init).
    #[must_use]
    pub fn new(
        config: Arc<MapConfig>,
        partition_id: u32,
        services: StoreServices,
        storage: Box<dyn StorageEngine>,
        data_store: Arc<dyn MapDataStore>,
    ) -> Self {
        let name = config.name.clone();
        let record_factory =
            RecordFactory::new(config.in_memory_format, Arc::clone(&services.serialization));
        let indexes = services.index_provider.indexes_for(&name, partition_id);
        let clock = Arc::clone(&services.clock);
        Self {
            store_adapter: RecordStoreAdapter::new(name.clone(), partition_id),
            name,
            partition_id,
            config,
            record_factory,
            storage,
            data_store,
            mutation_observer: CompositeMutationObserver::default(),
            indexes,
            services,
            lock_store: None,
            stats: Arc::new(LocalRecordStoreStats::new()),
            clock,
            expirable: false,
            initialized: false,
            _not_sync: PhantomData,
        }
    }

    /// The in-memory format of this store's values.
    #[must_use]
    pub fn in_memory_format(&self) -> InMemoryFormat {
        self.record_factory.format()
    }

    /// Replaces the storage's cost estimator.
    pub fn set_entry_cost_estimator(&mut self, estimator: EntryCostEstimator) {
        self.storage.set_entry_cost_estimator(estimator);
    }

    /// Hands `value` to the data store and returns the value to keep.
    ///
    /// Only a post-processing data store may replace the value; the record
    /// then already holds the replacement. Marks the record stored unless
    /// the write was merely queued.
    async fn run_map_store(
        &mut self,
        record: &mut Record,
        key: &Data,
        value: RecordValue,
        now: i64,
        txn_id: Option<Uuid>,
    ) -> Result<RecordValue> {
        let data_store = Arc::clone(&self.data_store);
        let expiration_time = record.metadata.expiration_time;
        let returned = data_store
            .add(key, &value, expiration_time, now, txn_id)
            .await
            .map_err(|error| {
                tracing::warn!(
                    map = %self.name,
                    partition = self.partition_id,
                    ?key,
                    %error,
                    "map store write failed"
                );
                RecordStoreError::Persistence(error)
            })?;

        let effective = if data_store.is_post_processing() {
            self.record_factory
                .set_value(record, returned)
                .map_err(RecordStoreError::Codec)?;
            record.value.clone()
        } else {
            value
        };
        if !data_store.is_write_behind() {
            record.metadata.on_store(now);
        }
        Ok(effective)
    }

    /// Inserts a freshly created record and notifies the observers.
    fn commit_new_record(&mut self, key: Data, record: Record) -> Result<Record> {
        let stored = self.storage.insert(key.clone(), record);
        self.mutation_observer
            .on_put(&key, stored)
            .map_err(RecordStoreError::Observer)?;
        Ok(stored.clone())
    }

    /// Installs a value read from the data store.
    fn put_loaded(&mut self, key: Data, value: RecordValue, now: i64) -> Result<Record> {
        let mut record = self.create_record(&key, value, &ExpiryPolicy::NONE, now)?;
        record.metadata.on_store(now);
        let stored = self.storage.insert(key.clone(), record);
        self.mutation_observer
            .on_load(&key, stored)
            .map_err(RecordStoreError::Observer)?;
        let record = stored.clone();
        self.save_index(&record, None);
        Ok(record)
    }

    async fn load_record(&mut self, key: &Data, now: i64) -> Result<Option<RecordValue>> {
        let data_store = Arc::clone(&self.data_store);
        if data_store.is_null() {
            return Ok(None);
        }
        let Some(value) = data_store
            .load(key)
            .await
            .map_err(RecordStoreError::Persistence)?
        else {
            return Ok(None);
        };
        let record = self.put_loaded(key.clone(), value, now)?;
        Ok(Some(record.value))
    }

    /// Drops `key` from memory and the indexes, then tells the observers.
    fn evict_entry(&mut self, key: &Data) -> Result<Option<Record>> {
        let Some(record) = self.storage.remove(key) else {
            return Ok(None);
        };
        self.remove_index(&record);
        self.mutation_observer
            .on_evict(key, &record)
            .map_err(RecordStoreError::Observer)?;
        Ok(Some(record))
    }

    fn expire_if_needed(&mut self, key: &Data, now: i64) -> Result<()> {
        if self.has_expired(key, now) != ExpiryReason::NotExpired {
            self.evict_entry(key)?;
        }
        Ok(())
    }

    fn mark_expirable(&mut self, record: &Record) {
        if record.metadata.expiration_time != NO_EXPIRY {
            self.expirable = true;
        }
    }

    fn is_locked(&self, key: &Data) -> bool {
        self.lock_store
            .as_ref()
            .is_some_and(|locks| locks.is_locked(key))
    }

    fn unlocked_keys(&self) -> Vec<Data> {
        self.storage
            .iter()
            .map(|(key, _)| key)
            .filter(|key| !self.is_locked(key))
            .cloned()
            .collect()
    }

    fn namespace(&self) -> ObjectNamespace {
        ObjectNamespace::for_map(&self.name)
    }
}

#[async_trait]
impl RecordStore for DefaultRecordStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn partition_id(&self) -> u32 {
        self.partition_id
    }

    fn config(&self) -> &MapConfig {
        &self.config
    }

    // --- Record primitives ---

    fn create_record(
        &mut self,
        key: &Data,
        value: RecordValue,
        expiry: &ExpiryPolicy,
        now: i64,
    ) -> Result<Record> {
        let mut record = self
            .record_factory
            .new_record(key.clone(), value, now)
            .map_err(RecordStoreError::Codec)?;
        set_expiration_times(expiry, &mut record.metadata, &self.config, true);
        self.mark_expirable(&record);
        self.stats.update_stats_on_put(false, now);
        Ok(record)
    }

    async fn put_new_record(
        &mut self,
        key: Data,
        value: RecordValue,
        expiry: ExpiryPolicy,
        now: i64,
        txn_id: Option<Uuid>,
    ) -> Result<Record> {
        let mut record = self.create_record(&key, value, &expiry, now)?;
        let value = record.value.clone();
        self.run_map_store(&mut record, &key, value, now, txn_id)
            .await?;
        self.commit_new_record(key, record)
    }

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
    ) -> Result<Record> {
        // Work on a staged copy: the stored record stays untouched until the
        // final storage write.
        let mut staged = record;
        let old_value = staged.value.clone();

        self.stats.update_stats_on_put(count_as_access, now);
        staged.metadata.on_update(now);
        if count_as_access {
            staged.metadata.on_access(now);
        }
        set_expiration_times(&expiry, &mut staged.metadata, &self.config, true);
        self.mark_expirable(&staged);

        let value = if is_map_store_operation {
            self.run_map_store(&mut staged, key, value, now, txn_id)
                .await?
        } else {
            value
        };
        let value = self
            .record_factory
            .to_format(value)
            .map_err(RecordStoreError::Codec)?;

        self.mutation_observer
            .on_update(key, &mut staged, &old_value, &value)
            .map_err(RecordStoreError::Observer)?;

        let mut committed = staged.clone();
        committed.value = value.clone();
        self.storage.update_record_value(key, staged, value);
        Ok(committed)
    }

    fn persistence_enabled_for(&self, provenance: CallerProvenance) -> bool {
        match provenance {
            CallerProvenance::NotWan => true,
            CallerProvenance::Wan => self.config.persist_wan_replicated_data,
        }
    }

    // --- Index integration ---

    fn save_index(&self, record: &Record, old_value: Option<&RecordValue>) {
        if !self.indexes.have_at_least_one_index() {
            return;
        }
        let entry = QueryableEntry {
            key: record.key(),
            value: &record.value,
            record,
            store_adapter: &self.store_adapter,
        };
        self.indexes
            .put_entry(&entry, old_value, OperationSource::User);
    }

    fn remove_index(&self, record: &Record) {
        if !self.indexes.have_at_least_one_index() {
            return;
        }
        self.indexes
            .remove_entry(record.key(), &record.value, OperationSource::User);
    }

    fn remove_indexes(&self, records: &[Record]) {
        if !self.indexes.have_at_least_one_index() {
            return;
        }
        for record in records {
            self.indexes
                .remove_entry(record.key(), &record.value, OperationSource::User);
        }
    }

    // --- Reporting ---

    fn owned_entry_cost(&self) -> u64 {
        self.storage.entry_cost_estimator().estimate()
    }

    fn local_record_store_stats(&self) -> Arc<LocalRecordStoreStats> {
        Arc::clone(&self.stats)
    }

    fn locked_entry_count(&self) -> Result<usize> {
        self.lock_store
            .as_ref()
            .map(|locks| locks.locked_entry_count())
            .ok_or_else(|| RecordStoreError::LockSupportDisabled {
                map: self.name.clone(),
                partition_id: self.partition_id,
            })
    }

    fn dispose_deferred_blocks(&mut self) {
        self.storage.dispose_deferred_blocks();
    }

    // --- Core CRUD ---

    async fn get(&mut self, key: &Data, touch: bool) -> Result<Option<RecordValue>> {
        let now = self.clock.now();
        self.expire_if_needed(key, now)?;

        if let Some(record) = self.storage.get_mut(key) {
            if touch {
                record.metadata.on_access(now);
                self.stats.update_stats_on_get(now);
            }
            return Ok(Some(record.value.clone()));
        }

        self.load_record(key, now).await
    }

    async fn get_all(&mut self, keys: &[Data]) -> Result<Vec<(Data, RecordValue)>> {
        let now = self.clock.now();
        let mut found = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();

        for key in keys {
            self.expire_if_needed(key, now)?;
            if let Some(record) = self.storage.get_mut(key) {
                record.metadata.on_access(now);
                self.stats.update_stats_on_get(now);
                found.push((key.clone(), record.value.clone()));
            } else if !self.data_store.is_null() {
                missing.push(key.clone());
            }
        }

        if !missing.is_empty() {
            let data_store = Arc::clone(&self.data_store);
            let loaded = data_store
                .load_all(&missing)
                .await
                .map_err(RecordStoreError::Persistence)?;
            for (key, value) in loaded {
                let record = self.put_loaded(key.clone(), value, now)?;
                found.push((key, record.value));
            }
        }

        Ok(found)
    }

    fn exists_in_memory(&self, key: &Data) -> bool {
        self.storage.contains_key(key)
    }

    async fn put(
        &mut self,
        key: Data,
        value: RecordValue,
        expiry: ExpiryPolicy,
        provenance: CallerProvenance,
    ) -> Result<Option<RecordValue>> {
        let now = self.clock.now();
        let persist = self.persistence_enabled_for(provenance);
        self.expire_if_needed(&key, now)?;

        let Some(existing) = self.storage.get(&key).cloned() else {
            let record = if persist {
                self.put_new_record(key, value, expiry, now, None).await?
            } else {
                let record = self.create_record(&key, value, &expiry, now)?;
                self.commit_new_record(key, record)?
            };
            self.save_index(&record, None);
            return Ok(None);
        };

        let old_value = existing.value.clone();
        let record = self
            .update_record(&key, existing, value, now, true, expiry, persist, None)
            .await?;
        self.save_index(&record, Some(&old_value));
        Ok(Some(old_value))
    }

    async fn remove(
        &mut self,
        key: &Data,
        provenance: CallerProvenance,
    ) -> Result<Option<RecordValue>> {
        let now = self.clock.now();
        let persist = self.persistence_enabled_for(provenance);
        self.expire_if_needed(key, now)?;
        let data_store = Arc::clone(&self.data_store);

        if !self.storage.contains_key(key) {
            if !persist || data_store.is_null() {
                return Ok(None);
            }
            // Not in memory: the external store may still hold it.
            let old = data_store
                .load(key)
                .await
                .map_err(RecordStoreError::Persistence)?;
            if old.is_some() {
                data_store
                    .remove(key, now, None)
                    .await
                    .map_err(RecordStoreError::Persistence)?;
            }
            return Ok(old);
        }

        if persist {
            data_store.remove(key, now, None).await.map_err(|error| {
                tracing::warn!(
                    map = %self.name,
                    partition = self.partition_id,
                    ?key,
                    %error,
                    "map store delete failed"
                );
                RecordStoreError::Persistence(error)
            })?;
        }

        if let Some(record) = self.storage.get(key) {
            self.remove_index(record);
        }
        let Some(record) = self.storage.remove(key) else {
            return Ok(None);
        };
        self.mutation_observer
            .on_remove(key, &record)
            .map_err(RecordStoreError::Observer)?;
        Ok(Some(record.value))
    }

    fn put_replicated_record(&mut self, mut record: Record) -> Result<()> {
        let now = self.clock.now();
        let key = record.key().clone();
        record.value = self
            .record_factory
            .to_format(record.value)
            .map_err(RecordStoreError::Codec)?;

        self.stats
            .update_stats_on_put_hits(u64::from(record.metadata.hits), now);
        self.mark_expirable(&record);

        let old_value = self.storage.get(&key).map(|r| r.value.clone());
        let stored = self.storage.insert(key.clone(), record);
        let notified = match &old_value {
            Some(old) => {
                let new_value = stored.value.clone();
                self.mutation_observer.on_update(&key, stored, old, &new_value)
            }
            None => self.mutation_observer.on_put(&key, stored),
        };
        notified.map_err(RecordStoreError::Observer)?;
        let record = stored.clone();
        self.save_index(&record, old_value.as_ref());
        Ok(())
    }

    // --- Iteration ---

    fn fetch_keys(&self, cursor: &IterationCursor, size: usize) -> FetchResult<Data> {
        self.storage.fetch_keys(cursor, size)
    }

    fn fetch_entries(&self, cursor: &IterationCursor, size: usize) -> FetchResult<(Data, Record)> {
        self.storage.fetch_entries(cursor, size)
    }

    fn for_each_boxed(&self, consumer: &mut dyn FnMut(&Data, &Record)) {
        let now = self.clock.now();
        for (key, record) in self.storage.iter() {
            if expiry_reason(&record.metadata, now) == ExpiryReason::NotExpired {
                consumer(key, record);
            }
        }
    }

    fn random_samples(&self, sample_count: usize) -> Vec<(Data, Record)> {
        self.storage.random_samples(sample_count)
    }

    // --- Size ---

    fn size(&self) -> usize {
        self.storage.len()
    }

    fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    // --- Expiry ---

    fn has_expired(&self, key: &Data, now: i64) -> ExpiryReason {
        self.storage
            .get(key)
            .map_or(ExpiryReason::NotExpired, |record| {
                expiry_reason(&record.metadata, now)
            })
    }

    fn evict_expired(&mut self, percentage: u32, now: i64) -> Result<usize> {
        let total = self.storage.len();
        let percentage = usize::try_from(percentage.min(100)).unwrap_or(100);
        let max_checks = total.saturating_mul(percentage).div_ceil(100);
        if max_checks == 0 {
            return Ok(0);
        }

        let expired: Vec<Data> = self
            .storage
            .iter()
            .take(max_checks)
            .filter(|(_, record)| expiry_reason(&record.metadata, now) != ExpiryReason::NotExpired)
            .map(|(key, _)| key.clone())
            .collect();

        let mut removed = 0;
        for key in &expired {
            if self.evict_entry(key)?.is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(map = %self.name, partition = self.partition_id, removed, "expired entries removed");
        }
        Ok(removed)
    }

    fn is_expirable(&self) -> bool {
        self.expirable
            || self.config.default_ttl_millis > 0
            || self.config.default_max_idle_millis > 0
    }

    // --- Eviction ---

    fn evict(&mut self, key: &Data) -> Result<Option<RecordValue>> {
        let Some(record) = self.evict_entry(key)? else {
            return Ok(None);
        };
        if record.metadata.is_dirty() && !self.data_store.is_null() {
            tracing::warn!(
                map = %self.name,
                partition = self.partition_id,
                ?key,
                "Dirty record evicted without being flushed; \
                 will be handled by next flush cycle or shutdown"
            );
        }
        Ok(Some(record.value))
    }

    fn evict_all(&mut self) -> Result<usize> {
        let keys = self.unlocked_keys();
        let evicted: Vec<Record> = keys
            .iter()
            .filter_map(|key| self.storage.remove(key))
            .collect();

        self.remove_indexes(&evicted);
        for record in &evicted {
            self.mutation_observer
                .on_evict(record.key(), record)
                .map_err(RecordStoreError::Observer)?;
        }
        Ok(evicted.len())
    }

    fn should_evict(&self) -> bool {
        let len = u64::try_from(self.storage.len()).unwrap_or(u64::MAX);
        self.config.max_entry_count > 0 && len >= self.config.max_entry_count
    }

    // --- Lifecycle ---

    fn init(&mut self) {
        if self.initialized {
            return;
        }

        if self.config.event_journal.enabled {
            if let Some(journal) = &self.services.event_journal {
                self.mutation_observer
                    .add(MutationObserver::EventJournal(EventJournalObserver::new(
                        Arc::clone(journal),
                        self.name.clone(),
                        self.partition_id,
                    )));
            }
        }
        if self.config.metadata_policy == MetadataPolicy::CreateOnUpdate {
            self.mutation_observer
                .add(MutationObserver::Metadata(MetadataObserver::new(Arc::clone(
                    &self.services.metadata_initializer,
                ))));
        }

        let namespace = self.namespace();
        self.lock_store = self
            .services
            .lock_service
            .as_ref()
            .and_then(|service| service.create_lock_store(self.partition_id, &namespace));
        self.initialized = true;

        tracing::debug!(
            map = %self.name,
            partition = self.partition_id,
            observers = self.mutation_observer.len(),
            lock_support = self.lock_store.is_some(),
            "record store initialized"
        );
    }

    async fn clear(&mut self) -> Result<usize> {
        let now = self.clock.now();
        let keys = self.unlocked_keys();
        let data_store = Arc::clone(&self.data_store);
        data_store
            .remove_all(&keys, now)
            .await
            .map_err(RecordStoreError::Persistence)?;

        let removed: Vec<Record> = keys
            .iter()
            .filter_map(|key| self.storage.remove(key))
            .collect();
        self.remove_indexes(&removed);
        self.mutation_observer
            .on_remove_all(&removed)
            .map_err(RecordStoreError::Observer)?;
        Ok(removed.len())
    }

    fn reset(&mut self) {
        let records = self.storage.clear();
        self.remove_indexes(&records);
        self.data_store.reset();
        self.expirable = false;
    }

    fn destroy(&mut self) {
        self.mutation_observer.on_destroy();
        let records = self.storage.clear();
        self.remove_indexes(&records);
        self.storage.destroy();
        self.data_store.reset();

        if let Some(service) = &self.services.lock_service {
            service.destroy_lock_store(self.partition_id, &self.namespace());
        }
        self.lock_store = None;
        tracing::debug!(map = %self.name, partition = self.partition_id, "record store destroyed");
    }

    // --- MapDataStore integration ---

    async fn soft_flush(&mut self) -> Result<u64> {
        let data_store = Arc::clone(&self.data_store);
        let sequence = data_store
            .soft_flush()
            .await
            .map_err(RecordStoreError::Persistence)?;
        tracing::debug!(map = %self.name, partition = self.partition_id, sequence, "soft flush requested");
        Ok(sequence)
    }

    async fn hard_flush(&mut self) -> Result<()> {
        let data_store = Arc::clone(&self.data_store);
        data_store
            .hard_flush()
            .await
            .map_err(RecordStoreError::Persistence)?;
        tracing::debug!(map = %self.name, partition = self.partition_id, "hard flush complete");
        Ok(())
    }

    async fn flush_due(&mut self, now: i64) -> Result<usize> {
        let data_store = Arc::clone(&self.data_store);
        let written = data_store
            .flush_due(now)
            .await
            .map_err(RecordStoreError::Persistence)?;
        if written > 0 {
            tracing::debug!(map = %self.name, partition = self.partition_id, written, "due writes flushed");
        }
        Ok(written)
    }

    fn storage(&self) -> &dyn StorageEngine {
        self.storage.as_ref()
    }

    fn map_data_store(&self) -> &dyn MapDataStore {
        self.data_store.as_ref()
    }
}
