//! Factory for creating fully-wired [`RecordStore`] instances.
//!
//! [`RecordStoreFactory`] is the dependency injection point of a map. It
//! picks the storage engine and the [`MapDataStore`] that match the map's
//! [`MapConfig`] and hands each partition's [`DefaultRecordStore`] the
//! node-wide collaborators collected in [`StoreServices`].

use std::sync::Arc;

use mapstore_core::{ClockSource, MsgPackSerializationService, SerializationService, SystemClock};

use crate::config::MapConfig;
use crate::storage::cost::EntryCostEstimator;
use crate::storage::datastores::{NullDataStore, WriteBehindDataStore, WriteThroughDataStore};
use crate::storage::engines::HashMapStorage;
use crate::storage::impls::DefaultRecordStore;
use crate::storage::indexes::{IndexProvider, NoIndexes};
use crate::storage::journal::{EventJournal, RingBufferEventJournal};
use crate::storage::lock_store::LockService;
use crate::storage::map_data_store::MapDataStore;
use crate::storage::map_store::MapStore;
use crate::storage::mutation_observer::{MetadataInitializer, StructuredMetadataInitializer};
use crate::storage::record_store::RecordStore;

/// Node-wide collaborators shared by every record store of a map.
///
/// Only the codec and the clock are required; everything else is optional
/// or has a no-op default.
#[derive(Clone)]
pub struct StoreServices {
    pub serialization: Arc<dyn SerializationService>,
    pub clock: Arc<dyn ClockSource>,
    pub event_journal: Option<Arc<dyn EventJournal>>,
    pub metadata_initializer: Arc<dyn MetadataInitializer>,
    pub lock_service: Option<Arc<dyn LockService>>,
    pub index_provider: Arc<dyn IndexProvider>,
    pub map_store: Option<Arc<dyn MapStore>>,
}

impl StoreServices {
    /// Creates services with structured metadata, no indexes and no optional
    /// collaborators.
    #[must_use]
    pub fn new(serialization: Arc<dyn SerializationService>, clock: Arc<dyn ClockSource>) -> Self {
        let metadata_initializer = Arc::new(StructuredMetadataInitializer::new(Arc::clone(
            &serialization,
        )));
        Self {
            serialization,
            clock,
            event_journal: None,
            metadata_initializer,
            lock_service: None,
            index_provider: Arc::new(NoIndexes),
            map_store: None,
        }
    }

    /// Uses `journal` for every event-journal observer.
    #[must_use]
    pub fn with_event_journal(mut self, journal: Arc<dyn EventJournal>) -> Self {
        self.event_journal = Some(journal);
        self
    }

    /// Replaces the metadata initializer.
    #[must_use]
    pub fn with_metadata_initializer(mut self, initializer: Arc<dyn MetadataInitializer>) -> Self {
        self.metadata_initializer = initializer;
        self
    }

    /// Enables key locks through `service`.
    #[must_use]
    pub fn with_lock_service(mut self, service: Arc<dyn LockService>) -> Self {
        self.lock_service = Some(service);
        self
    }

    /// Replaces the index provider.
    #[must_use]
    pub fn with_index_provider(mut self, provider: Arc<dyn IndexProvider>) -> Self {
        self.index_provider = provider;
        self
    }

    /// External store used when the map config enables one.
    #[must_use]
    pub fn with_map_store(mut self, store: Arc<dyn MapStore>) -> Self {
        self.map_store = Some(store);
        self
    }
}

impl Default for StoreServices {
    fn default() -> Self {
        Self::new(Arc::new(MsgPackSerializationService), Arc::new(SystemClock))
    }
}

/// Creates the record stores of one map.
///
/// The map's configuration and collaborators are fixed at construction;
/// each [`create()`](Self::create) call produces a new, initialized store
/// for one partition.
pub struct RecordStoreFactory {
    config: Arc<MapConfig>,
    services: StoreServices,
}

impl RecordStoreFactory {
    /// Creates a factory for the map described by `config`.
    ///
    /// When the map's event journal is enabled and no journal was supplied,
    /// an in-memory ring buffer of the configured capacity is used.
    #[must_use]
    pub fn new(config: MapConfig, mut services: StoreServices) -> Self {
        if config.event_journal.enabled && services.event_journal.is_none() {
            services.event_journal = Some(Arc::new(RingBufferEventJournal::new(
                config.event_journal.capacity,
            )));
        }
        Self {
            config: Arc::new(config),
            services,
        }
    }

    /// The map configuration shared by every store this factory creates.
    #[must_use]
    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    /// Creates an initialized [`RecordStore`] for `partition_id`.
    #[must_use]
    pub fn create(&self, partition_id: u32) -> Box<dyn RecordStore> {
        Box::new(self.create_default(partition_id))
    }

    /// Same as [`create()`](Self::create), without type erasure.
    #[must_use]
    pub fn create_default(&self, partition_id: u32) -> DefaultRecordStore {
        let storage = Box::new(HashMapStorage::new(EntryCostEstimator::for_format(
            self.config.in_memory_format,
        )));
        let mut store = DefaultRecordStore::new(
            Arc::clone(&self.config),
            partition_id,
            self.services.clone(),
            storage,
            self.data_store(),
        );
        store.init();
        store
    }

    /// Null when no store is configured, otherwise write-behind or
    /// write-through depending on the write delay.
    fn data_store(&self) -> Arc<dyn MapDataStore> {
        let settings = &self.config.map_store;
        match &self.services.map_store {
            Some(store) if settings.enabled && settings.is_write_behind() => {
                Arc::new(WriteBehindDataStore::new(Arc::clone(store), settings))
            }
            Some(store) if settings.enabled => Arc::new(WriteThroughDataStore::new(Arc::clone(store))),
            _ => Arc::new(NullDataStore),
        }
    }
}

#[cfg(test)]
mod tests {
    use mapstore_core::{Data, InMemoryFormat, Value};

    use super::*;
    use crate::config::{EventJournalConfig, MapStoreConfig};
    use crate::storage::expiry::ExpiryPolicy;
    use crate::storage::record::RecordValue;
    use crate::storage::record_store::CallerProvenance;
    use crate::storage::test_support::InMemoryMapStore;

    fn key(s: &str) -> Data {
        Data::from(s.as_bytes())
    }

    fn value(s: &str) -> RecordValue {
        RecordValue::Object(Value::from(s))
    }

    fn object_config(name: &str) -> MapConfig {
        MapConfig {
            in_memory_format: InMemoryFormat::Object,
            ..MapConfig::new(name)
        }
    }

    #[tokio::test]
    async fn create_returns_working_record_store() {
        let factory = RecordStoreFactory::new(object_config("users"), StoreServices::default());

        let mut store = factory.create(7);
        assert_eq!(store.name(), "users");
        assert_eq!(store.partition_id(), 7);

        store
            .put(key("alice"), value("data"), ExpiryPolicy::NONE, CallerProvenance::NotWan)
            .await
            .unwrap();

        assert_eq!(store.get(&key("alice"), false).await.unwrap(), Some(value("data")));
        assert_eq!(store.size(), 1);
    }

    #[tokio::test]
    async fn stores_for_different_partitions_are_independent() {
        let factory = RecordStoreFactory::new(object_config("users"), StoreServices::default());
        let mut a = factory.create(0);
        let b = factory.create(1);

        a.put(key("k"), value("a"), ExpiryPolicy::NONE, CallerProvenance::NotWan)
            .await
            .unwrap();

        assert_eq!(a.size(), 1);
        assert_eq!(b.size(), 0);
    }

    #[test]
    fn data_store_follows_map_store_settings() {
        let store: Arc<dyn MapStore> = InMemoryMapStore::new();

        let none = RecordStoreFactory::new(MapConfig::new("m"), StoreServices::default());
        assert!(none.create(0).map_data_store().is_null());

        let disabled = RecordStoreFactory::new(
            MapConfig::new("m"),
            StoreServices::default().with_map_store(Arc::clone(&store)),
        );
        assert!(disabled.create(0).map_data_store().is_null());

        let through_config = MapConfig {
            map_store: MapStoreConfig {
                enabled: true,
                ..MapStoreConfig::default()
            },
            ..MapConfig::new("m")
        };
        let through = RecordStoreFactory::new(
            through_config,
            StoreServices::default().with_map_store(Arc::clone(&store)),
        );
        let through = through.create(0);
        assert!(!through.map_data_store().is_null());
        assert!(!through.map_data_store().is_write_behind());

        let behind_config = MapConfig {
            map_store: MapStoreConfig {
                enabled: true,
                write_delay_seconds: 5,
                ..MapStoreConfig::default()
            },
            ..MapConfig::new("m")
        };
        let behind =
            RecordStoreFactory::new(behind_config, StoreServices::default().with_map_store(store));
        assert!(behind.create(0).map_data_store().is_write_behind());
    }

    #[tokio::test]
    async fn enabled_journal_without_sink_gets_ring_buffer() {
        let config = MapConfig {
            event_journal: EventJournalConfig {
                enabled: true,
                capacity: 16,
            },
            ..object_config("events")
        };
        let factory = RecordStoreFactory::new(config, StoreServices::default());
        assert!(factory.services.event_journal.is_some());

        let mut store = factory.create(3);
        store
            .put(key("k"), value("v"), ExpiryPolicy::NONE, CallerProvenance::NotWan)
            .await
            .unwrap();
    }

    #[test]
    fn factory_propagates_config() {
        let config = MapConfig {
            default_ttl_millis: 5000,
            max_entry_count: 100,
            ..MapConfig::new("events")
        };
        let factory = RecordStoreFactory::new(config, StoreServices::default());

        let store = factory.create(3);
        assert!(store.is_expirable());
        assert_eq!(store.config().max_entry_count, 100);
        assert_eq!(factory.config().name, "events");
    }
}
