//! Per-partition event journal.
//!
//! The [`EventJournal`] trait is the sink the event-journal mutation
//! observer writes to. [`RingBufferEventJournal`] keeps a bounded ring of
//! events per (map, partition) with monotonically increasing sequences.

use std::collections::VecDeque;

use dashmap::DashMap;
use mapstore_core::Data;

use super::record::RecordValue;

/// Kind of change recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEventType {
    /// A key was written for the first time.
    Added,
    /// An existing key got a new value.
    Updated,
    /// A key was removed by a caller.
    Removed,
    /// A key was dropped from memory only.
    Evicted,
    /// A key was brought in from the external store.
    Loaded,
}

/// One journal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JournalEvent {
    pub event_type: JournalEventType,
    pub key: Data,
    /// Value before the change; `None` for additions and loads.
    pub old_value: Option<RecordValue>,
    /// Value after the change; `None` for removals and evictions.
    pub new_value: Option<RecordValue>,
}

impl JournalEvent {
    /// Creates an event.
    #[must_use]
    pub fn new(
        event_type: JournalEventType,
        key: Data,
        old_value: Option<RecordValue>,
        new_value: Option<RecordValue>,
    ) -> Self {
        Self {
            event_type,
            key,
            old_value,
            new_value,
        }
    }
}

/// Append-only sink for journal events.
///
/// Used as `Arc<dyn EventJournal>`.
pub trait EventJournal: Send + Sync {
    /// Appends an event for the partition and returns its sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot accept the event.
    fn write(&self, map: &str, partition_id: u32, event: JournalEvent) -> anyhow::Result<u64>;

    /// Drops everything journaled for the partition.
    fn destroy(&self, map: &str, partition_id: u32);
}

#[derive(Default)]
struct Ring {
    events: VecDeque<(u64, JournalEvent)>,
    next_sequence: u64,
}

/// In-memory [`EventJournal`] that keeps the latest `capacity` events per
/// (map, partition). Older events fall off the head. A capacity of 0 keeps
/// every event.
pub struct RingBufferEventJournal {
    capacity: usize,
    rings: DashMap<(String, u32), Ring>,
}

impl RingBufferEventJournal {
    /// Creates a journal retaining `capacity` events per partition, or all of
    /// them when `capacity` is 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rings: DashMap::new(),
        }
    }

    /// Events with sequence `>= sequence`, oldest first.
    #[must_use]
    pub fn read_from(&self, map: &str, partition_id: u32, sequence: u64) -> Vec<JournalEvent> {
        self.rings
            .get(&(map.to_string(), partition_id))
            .map(|ring| {
                ring.events
                    .iter()
                    .filter(|(seq, _)| *seq >= sequence)
                    .map(|(_, event)| event.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sequence of the oldest retained event.
    #[must_use]
    pub fn oldest_sequence(&self, map: &str, partition_id: u32) -> Option<u64> {
        self.rings
            .get(&(map.to_string(), partition_id))
            .and_then(|ring| ring.events.front().map(|(seq, _)| *seq))
    }

    /// Sequence of the newest event.
    #[must_use]
    pub fn newest_sequence(&self, map: &str, partition_id: u32) -> Option<u64> {
        self.rings
            .get(&(map.to_string(), partition_id))
            .and_then(|ring| ring.events.back().map(|(seq, _)| *seq))
    }
}

impl EventJournal for RingBufferEventJournal {
    fn write(&self, map: &str, partition_id: u32, event: JournalEvent) -> anyhow::Result<u64> {
        let mut ring = self.rings.entry((map.to_string(), partition_id)).or_default();
        let sequence = ring.next_sequence;
        ring.next_sequence += 1;
        if self.capacity > 0 && ring.events.len() == self.capacity {
            ring.events.pop_front();
        }
        ring.events.push_back((sequence, event));
        Ok(sequence)
    }

    fn destroy(&self, map: &str, partition_id: u32) {
        self.rings.remove(&(map.to_string(), partition_id));
    }
}
