//! Record types for the storage layer.
//!
//! Defines the core data structures stored in [`StorageEngine`](super::StorageEngine):
//! [`Record`], [`RecordMetadata`], [`RecordValue`], and [`NativeBlock`].

use std::fmt;

use bytes::Bytes;
use mapstore_core::{Data, InMemoryFormat, Value};

/// Expiration time of a record that never expires.
pub const NO_EXPIRY: i64 = i64::MAX;

/// Metadata tracked for every record in the [`RecordStore`](super::RecordStore).
///
/// Tracks version, access statistics, timestamps and the expiration inputs
/// for eviction, expiry and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    /// Record version, incremented on every update.
    pub version: u32,
    /// Wall-clock time (millis since epoch) when this record was created.
    pub creation_time: i64,
    /// Wall-clock time of the last read access.
    pub last_access_time: i64,
    /// Wall-clock time of the last write.
    pub last_update_time: i64,
    /// Wall-clock time when last persisted to the `MapDataStore`. 0 = never stored.
    pub last_stored_time: i64,
    /// Number of read accesses.
    pub hits: u32,
    /// Effective time-to-live in milliseconds. 0 = none.
    pub ttl_millis: u64,
    /// Effective max idle time in milliseconds. 0 = none.
    pub max_idle_millis: u64,
    /// Absolute expiration time, or [`NO_EXPIRY`].
    pub expiration_time: i64,
}

impl Default for RecordMetadata {
    fn default() -> Self {
        Self {
            version: 0,
            creation_time: 0,
            last_access_time: 0,
            last_update_time: 0,
            last_stored_time: 0,
            hits: 0,
            ttl_millis: 0,
            max_idle_millis: 0,
            expiration_time: NO_EXPIRY,
        }
    }
}

impl RecordMetadata {
    /// Creates new metadata with the given wall-clock time.
    ///
    /// Sets `creation_time`, `last_access_time`, and `last_update_time` to `now`.
    /// Version starts at 1, hits at 0, and `last_stored_time` at 0 (never stored).
    #[must_use]
    pub fn new(now: i64) -> Self {
        Self {
            version: 1,
            creation_time: now,
            last_access_time: now,
            last_update_time: now,
            ..Self::default()
        }
    }

    /// Records a read access: increments `hits` and updates `last_access_time`.
    ///
    /// With a max idle time set, the expiration time moves along with the access.
    pub fn on_access(&mut self, now: i64) {
        self.hits = self.hits.saturating_add(1);
        self.last_access_time = now;
        if self.max_idle_millis > 0 {
            self.refresh_expiration_time();
        }
    }

    /// Records a write: increments `version` and updates `last_update_time`.
    pub fn on_update(&mut self, now: i64) {
        self.version = self.version.saturating_add(1);
        self.last_update_time = now;
    }

    /// Records a persistence event: updates `last_stored_time`.
    pub fn on_store(&mut self, now: i64) {
        self.last_stored_time = now;
    }

    /// Returns `true` if the record has been modified since it was last stored.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.last_update_time > self.last_stored_time
    }

    /// Recomputes `expiration_time` from the TTL and max idle inputs.
    ///
    /// TTL counts from the last update, max idle from the last access
    /// (or creation, whichever is later). The earlier deadline wins.
    #[allow(clippy::cast_possible_wrap)]
    pub fn refresh_expiration_time(&mut self) {
        let ttl_deadline = if self.ttl_millis > 0 {
            self.last_update_time
                .saturating_add(self.ttl_millis.min(i64::MAX as u64) as i64)
        } else {
            NO_EXPIRY
        };
        let idle_deadline = if self.max_idle_millis > 0 {
            self.last_access_time
                .max(self.creation_time)
                .saturating_add(self.max_idle_millis.min(i64::MAX as u64) as i64)
        } else {
            NO_EXPIRY
        };
        self.expiration_time = ttl_deadline.min(idle_deadline);
    }
}

/// A value held in a separately managed memory block.
///
/// Blocks released by a remove or replace are parked by the storage until
/// [`dispose_deferred_blocks`](super::StorageEngine::dispose_deferred_blocks)
/// runs, so that in-flight readers never observe a freed block.
#[derive(Clone, PartialEq, Eq)]
pub struct NativeBlock(Bytes);

impl NativeBlock {
    /// Wraps serialized bytes in a block.
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Borrows the block contents.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Size of the block in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the block is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies the block out as serialized [`Data`].
    #[must_use]
    pub fn to_data(&self) -> Data {
        Data::from(self.0.clone())
    }
}

impl fmt::Debug for NativeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeBlock({} bytes)", self.0.len())
    }
}

/// The value portion of a record, tagged with its in-memory representation.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// Serialized value.
    Binary(Data),
    /// Deserialized value.
    Object(Value),
    /// Serialized value held in a separately managed block.
    Native(NativeBlock),
}

impl RecordValue {
    /// The in-memory format this value is represented in.
    #[must_use]
    pub fn format(&self) -> InMemoryFormat {
        match self {
            Self::Binary(_) => InMemoryFormat::Binary,
            Self::Object(_) => InMemoryFormat::Object,
            Self::Native(_) => InMemoryFormat::Native,
        }
    }

    /// Approximate size of the value in bytes.
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        match self {
            Self::Binary(data) => data.len(),
            Self::Object(value) => value.estimated_size(),
            Self::Native(block) => block.len(),
        }
    }
}

impl From<Value> for RecordValue {
    fn from(value: Value) -> Self {
        Self::Object(value)
    }
}

impl From<Data> for RecordValue {
    fn from(data: Data) -> Self {
        Self::Binary(data)
    }
}

/// A complete record: key, value, metadata and derived value metadata.
///
/// This is the primary unit of storage in the [`StorageEngine`](super::StorageEngine).
/// The key is fixed at creation.
#[derive(Debug, Clone)]
pub struct Record {
    key: Data,
    /// The current value.
    pub value: RecordValue,
    /// Timestamps, counters and expiration inputs.
    pub metadata: RecordMetadata,
    /// Metadata derived from the value by the structured-metadata observer.
    pub attached_metadata: Option<Value>,
}

impl Record {
    /// Creates a record stamped at `now`.
    #[must_use]
    pub fn new(key: Data, value: RecordValue, now: i64) -> Self {
        Self {
            key,
            value,
            metadata: RecordMetadata::new(now),
            attached_metadata: None,
        }
    }

    /// The record's key.
    #[must_use]
    pub fn key(&self) -> &Data {
        &self.key
    }
}
