//! Per record store usage statistics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Hit count and last access/update times of one record store.
///
/// Written only by the owning partition thread; monitoring may read the
/// fields concurrently. Each field is read atomically on its own, with no
/// consistency across fields.
#[derive(Debug, Default)]
pub struct LocalRecordStoreStats {
    hits: AtomicU64,
    last_access_time: AtomicI64,
    last_update_time: AtomicI64,
}

impl LocalRecordStoreStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A write at `now`. With `count_as_access` the write also counts as a read.
    pub fn update_stats_on_put(&self, count_as_access: bool, now: i64) {
        self.last_update_time.store(now, Ordering::Relaxed);
        if count_as_access {
            self.update_stats_on_get(now);
        }
    }

    /// A write that carries `hits` over from elsewhere (migration, load).
    pub fn update_stats_on_put_hits(&self, hits: u64, now: i64) {
        self.last_update_time.store(now, Ordering::Relaxed);
        self.increase_hits(hits);
    }

    /// A read at `now`.
    pub fn update_stats_on_get(&self, now: i64) {
        self.last_access_time.store(now, Ordering::Relaxed);
        self.increase_hits(1);
    }

    fn increase_hits(&self, hits: u64) {
        self.hits.fetch_add(hits, Ordering::Relaxed);
    }

    /// Reads since creation or the last [`reset`](Self::reset).
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Time of the latest read, 0 if none.
    #[must_use]
    pub fn last_access_time(&self) -> i64 {
        self.last_access_time.load(Ordering::Relaxed)
    }

    /// Time of the latest write, 0 if none.
    #[must_use]
    pub fn last_update_time(&self) -> i64 {
        self.last_update_time.load(Ordering::Relaxed)
    }

    /// Clears all counters.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.last_access_time.store(0, Ordering::Relaxed);
        self.last_update_time.store(0, Ordering::Relaxed);
    }

    /// Point-in-time copy for reporting.
    #[must_use]
    pub fn snapshot(&self) -> RecordStoreStatsSnapshot {
        RecordStoreStatsSnapshot {
            hits: self.hits(),
            last_access_time: self.last_access_time(),
            last_update_time: self.last_update_time(),
        }
    }
}

/// Serializable copy of [`LocalRecordStoreStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStoreStatsSnapshot {
    pub hits: u64,
    pub last_access_time: i64,
    pub last_update_time: i64,
}
