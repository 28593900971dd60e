//! Per-map configuration consumed by the record store.
//!
//! Every type here has a `Default` suitable for tests and can also be
//! deserialized from camelCase JSON (missing fields fall back to defaults).

use mapstore_core::InMemoryFormat;
use serde::{Deserialize, Serialize};

/// Configuration for one distributed map, shared by all of its partitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapConfig {
    /// Map name.
    pub name: String,
    /// In-memory representation of values.
    pub in_memory_format: InMemoryFormat,
    /// Default TTL in milliseconds for new records. 0 = no TTL.
    pub default_ttl_millis: u64,
    /// Default max idle time in milliseconds. 0 = no max idle.
    pub default_max_idle_millis: u64,
    /// Maximum number of entries per partition before eviction triggers. 0 = unlimited.
    pub max_entry_count: u64,
    /// When derived value metadata is (re)computed.
    pub metadata_policy: MetadataPolicy,
    /// Change journal settings.
    pub event_journal: EventJournalConfig,
    /// External persistence settings.
    pub map_store: MapStoreConfig,
    /// Whether changes replicated over WAN are also written to the map store.
    pub persist_wan_replicated_data: bool,
}

impl MapConfig {
    /// Creates a default configuration for the named map.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parses a map configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid JSON or a field has the
    /// wrong type.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            in_memory_format: InMemoryFormat::default(),
            default_ttl_millis: 0,
            default_max_idle_millis: 0,
            max_entry_count: 0,
            metadata_policy: MetadataPolicy::default(),
            event_journal: EventJournalConfig::default(),
            map_store: MapStoreConfig::default(),
            persist_wan_replicated_data: false,
        }
    }
}

/// Controls the structured-metadata mutation observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetadataPolicy {
    /// Metadata is extracted on every put and update.
    #[default]
    CreateOnUpdate,
    /// No metadata is maintained.
    Off,
}

/// Event journal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventJournalConfig {
    /// Whether mutations are appended to the journal.
    pub enabled: bool,
    /// Events retained per partition. 0 = unbounded.
    pub capacity: usize,
}

impl Default for EventJournalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 10_000,
        }
    }
}

/// Map store (external persistence) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapStoreConfig {
    /// Whether the configured map store is used at all.
    pub enabled: bool,
    /// 0 = write-through; otherwise writes are queued for this many seconds.
    pub write_delay_seconds: u64,
    /// Maximum entries handed to the map store in one batch when flushing.
    pub write_batch_size: usize,
    /// Keep only the latest queued write per key.
    pub write_coalescing: bool,
}

impl Default for MapStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            write_delay_seconds: 0,
            write_batch_size: 1,
            write_coalescing: true,
        }
    }
}

impl MapStoreConfig {
    /// Whether writes are queued instead of written through.
    #[must_use]
    pub fn is_write_behind(&self) -> bool {
        self.write_delay_seconds > 0
    }
}
