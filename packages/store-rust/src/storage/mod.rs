//! Partition record store.
//!
//! Provides the trait hierarchy and shared types for the layered storage of
//! one map partition:
//!
//! - **Storage** ([`StorageEngine`]): in-memory key/record container with
//!   entry cost tracking
//! - **Record store** ([`RecordStore`]): per-map-per-partition orchestration
//!   of records, expiry, eviction, indexes, locks and statistics
//! - **Persistence** ([`MapDataStore`]): write-through or write-behind access
//!   to a user [`MapStore`]
//!
//! Mutations fan out to the [`MutationObserver`]s held by a
//! [`CompositeMutationObserver`].

pub mod cost;
pub mod datastores;
pub mod engine;
pub mod engines;
pub mod error;
pub mod expiry;
pub mod factory;
pub mod impls;
pub mod indexes;
pub mod journal;
pub mod lock_store;
pub mod map_data_store;
pub mod map_store;
pub mod mutation_observer;
pub mod record;
pub mod record_factory;
pub mod record_store;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_support;

pub use cost::{CostGauge, CostModel, EntryCostEstimator};
pub use engine::*;
pub use error::{RecordStoreError, Result};
pub use expiry::{ExpiryPolicy, ExpiryReason};
pub use factory::{RecordStoreFactory, StoreServices};
pub use impls::DefaultRecordStore;
pub use indexes::*;
pub use journal::*;
pub use lock_store::*;
pub use map_data_store::*;
pub use map_store::*;
pub use mutation_observer::*;
pub use record::*;
pub use record_factory::RecordFactory;
pub use record_store::*;
pub use stats::{LocalRecordStoreStats, RecordStoreStatsSnapshot};
