//! `mapstore` is the per-partition record store of a distributed key/value map.
//!
//! Each map partition owns one [`RecordStore`](storage::RecordStore) that
//! keeps its records in memory, persists them through an optional external
//! store, and keeps indexes, event journal, locks and statistics in step.

pub mod config;
pub mod storage;

pub use config::{EventJournalConfig, MapConfig, MapStoreConfig, MetadataPolicy};
pub use storage::{
    CallerProvenance, DefaultRecordStore, RecordStore, RecordStoreError, RecordStoreFactory,
    StoreServices,
};
