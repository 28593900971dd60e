//! Mutation observers and their composite.
//!
//! Observers react to record mutations inside a
//! [`RecordStore`](super::RecordStore). The set is closed: an event-journal
//! observer and a structured-metadata observer, modelled as variants of
//! [`MutationObserver`]. [`CompositeMutationObserver`] broadcasts every
//! notification to its observers in registration order.

use std::collections::BTreeMap;
use std::sync::Arc;

use mapstore_core::{Data, SerializationService, Value};

use super::journal::{EventJournal, JournalEvent, JournalEventType};
use super::record::{Record, RecordValue};

/// Derives metadata from a record value (for example the field names of a
/// structured document).
pub trait MetadataInitializer: Send + Sync {
    /// Returns the metadata for `value`, or `None` if the value has no
    /// structure worth describing.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be inspected.
    fn create_from_value(&self, value: &RecordValue) -> anyhow::Result<Option<Value>>;
}

/// Extracts the top-level field names of map values and of strings holding
/// a JSON object.
///
/// The resulting metadata is `{"fields": [name, ...]}` with names sorted.
pub struct StructuredMetadataInitializer {
    serialization: Arc<dyn SerializationService>,
}

impl StructuredMetadataInitializer {
    /// Creates an initializer that decodes binary values with `serialization`.
    #[must_use]
    pub fn new(serialization: Arc<dyn SerializationService>) -> Self {
        Self { serialization }
    }

    fn to_object(&self, value: &RecordValue) -> anyhow::Result<Value> {
        match value {
            RecordValue::Object(v) => Ok(v.clone()),
            RecordValue::Binary(data) => self.serialization.to_object(data),
            RecordValue::Native(block) => self.serialization.to_object(&block.to_data()),
        }
    }
}

fn fields_metadata(names: Vec<String>) -> Value {
    let mut meta = BTreeMap::new();
    meta.insert(
        "fields".to_string(),
        Value::Array(names.into_iter().map(Value::String).collect()),
    );
    Value::Map(meta)
}

impl MetadataInitializer for StructuredMetadataInitializer {
    fn create_from_value(&self, value: &RecordValue) -> anyhow::Result<Option<Value>> {
        match self.to_object(value)? {
            Value::Map(map) => Ok(Some(fields_metadata(map.into_keys().collect()))),
            Value::String(text) => {
                let Ok(serde_json::Value::Object(object)) =
                    serde_json::from_str::<serde_json::Value>(&text)
                else {
                    return Ok(None);
                };
                let mut names: Vec<String> = object.into_iter().map(|(k, _)| k).collect();
                names.sort();
                Ok(Some(fields_metadata(names)))
            }
            _ => Ok(None),
        }
    }
}

/// Appends a journal event for every mutation of one partition.
pub struct EventJournalObserver {
    journal: Arc<dyn EventJournal>,
    map: String,
    partition_id: u32,
}

impl EventJournalObserver {
    /// Creates an observer writing to `journal` under (`map`, `partition_id`).
    #[must_use]
    pub fn new(journal: Arc<dyn EventJournal>, map: impl Into<String>, partition_id: u32) -> Self {
        Self {
            journal,
            map: map.into(),
            partition_id,
        }
    }

    fn write(
        &self,
        event_type: JournalEventType,
        key: &Data,
        old_value: Option<&RecordValue>,
        new_value: Option<&RecordValue>,
    ) -> anyhow::Result<()> {
        self.journal.write(
            &self.map,
            self.partition_id,
            JournalEvent::new(event_type, key.clone(), old_value.cloned(), new_value.cloned()),
        )?;
        Ok(())
    }
}

/// Keeps [`Record::attached_metadata`] in step with the record value.
///
/// Extraction failures never fail the write: they are logged and the
/// record's metadata is cleared.
pub struct MetadataObserver {
    initializer: Arc<dyn MetadataInitializer>,
}

impl MetadataObserver {
    /// Creates an observer backed by `initializer`.
    #[must_use]
    pub fn new(initializer: Arc<dyn MetadataInitializer>) -> Self {
        Self { initializer }
    }

    fn attach(&self, key: &Data, record: &mut Record, value: &RecordValue) {
        record.attached_metadata = match self.initializer.create_from_value(value) {
            Ok(meta) => meta,
            Err(error) => {
                tracing::warn!(?key, %error, "metadata extraction failed");
                None
            }
        };
    }
}

/// One observer of record mutations.
pub enum MutationObserver {
    EventJournal(EventJournalObserver),
    Metadata(MetadataObserver),
}

impl MutationObserver {
    fn on_put(&self, key: &Data, record: &mut Record) -> anyhow::Result<()> {
        match self {
            Self::EventJournal(o) => {
                o.write(JournalEventType::Added, key, None, Some(&record.value))
            }
            Self::Metadata(o) => {
                let value = record.value.clone();
                o.attach(key, record, &value);
                Ok(())
            }
        }
    }

    fn on_update(
        &self,
        key: &Data,
        record: &mut Record,
        old_value: &RecordValue,
        new_value: &RecordValue,
    ) -> anyhow::Result<()> {
        match self {
            Self::EventJournal(o) => o.write(
                JournalEventType::Updated,
                key,
                Some(old_value),
                Some(new_value),
            ),
            Self::Metadata(o) => {
                o.attach(key, record, new_value);
                Ok(())
            }
        }
    }

    fn on_remove(&self, key: &Data, record: &Record) -> anyhow::Result<()> {
        match self {
            Self::EventJournal(o) => {
                o.write(JournalEventType::Removed, key, Some(&record.value), None)
            }
            Self::Metadata(_) => Ok(()),
        }
    }

    fn on_evict(&self, key: &Data, record: &Record) -> anyhow::Result<()> {
        match self {
            Self::EventJournal(o) => {
                o.write(JournalEventType::Evicted, key, Some(&record.value), None)
            }
            Self::Metadata(_) => Ok(()),
        }
    }

    fn on_load(&self, key: &Data, record: &mut Record) -> anyhow::Result<()> {
        match self {
            Self::EventJournal(o) => {
                o.write(JournalEventType::Loaded, key, None, Some(&record.value))
            }
            Self::Metadata(o) => {
                let value = record.value.clone();
                o.attach(key, record, &value);
                Ok(())
            }
        }
    }

    fn on_destroy(&self) {
        if let Self::EventJournal(o) = self {
            o.journal.destroy(&o.map, o.partition_id);
        }
    }
}

/// Broadcasts notifications to every registered observer, in registration
/// order. The first failing observer stops the broadcast and its error is
/// returned; nothing already applied is rolled back.
#[derive(Default)]
pub struct CompositeMutationObserver {
    observers: Vec<MutationObserver>,
}

impl CompositeMutationObserver {
    /// Creates a composite observer with the given list of observers.
    #[must_use]
    pub fn new(observers: Vec<MutationObserver>) -> Self {
        Self { observers }
    }

    /// Appends an observer.
    pub fn add(&mut self, observer: MutationObserver) {
        self.observers.push(observer);
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Called after a new record has been inserted into storage.
    ///
    /// # Errors
    ///
    /// Returns the first observer failure.
    pub fn on_put(&self, key: &Data, record: &mut Record) -> anyhow::Result<()> {
        for observer in &self.observers {
            observer.on_put(key, record)?;
        }
        Ok(())
    }

    /// Called before an update is committed. `old_value` is the value being
    /// superseded; `new_value` is what will be stored.
    ///
    /// # Errors
    ///
    /// Returns the first observer failure.
    pub fn on_update(
        &self,
        key: &Data,
        record: &mut Record,
        old_value: &RecordValue,
        new_value: &RecordValue,
    ) -> anyhow::Result<()> {
        for observer in &self.observers {
            observer.on_update(key, record, old_value, new_value)?;
        }
        Ok(())
    }

    /// Called after a record is removed.
    ///
    /// # Errors
    ///
    /// Returns the first observer failure.
    pub fn on_remove(&self, key: &Data, record: &Record) -> anyhow::Result<()> {
        for observer in &self.observers {
            observer.on_remove(key, record)?;
        }
        Ok(())
    }

    /// Called once for a bulk removal.
    ///
    /// # Errors
    ///
    /// Returns the first observer failure.
    pub fn on_remove_all(&self, records: &[Record]) -> anyhow::Result<()> {
        for observer in &self.observers {
            for record in records {
                observer.on_remove(record.key(), record)?;
            }
        }
        Ok(())
    }

    /// Called after a record is evicted or expired.
    ///
    /// # Errors
    ///
    /// Returns the first observer failure.
    pub fn on_evict(&self, key: &Data, record: &Record) -> anyhow::Result<()> {
        for observer in &self.observers {
            observer.on_evict(key, record)?;
        }
        Ok(())
    }

    /// Called after a record is loaded from the data store.
    ///
    /// # Errors
    ///
    /// Returns the first observer failure.
    pub fn on_load(&self, key: &Data, record: &mut Record) -> anyhow::Result<()> {
        for observer in &self.observers {
            observer.on_load(key, record)?;
        }
        Ok(())
    }

    /// Called when the record store is destroyed.
    pub fn on_destroy(&self) {
        for observer in &self.observers {
            observer.on_destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use mapstore_core::MsgPackSerializationService;
    use parking_lot::Mutex;

    use super::*;
    use crate::storage::journal::RingBufferEventJournal;

    /// Journal that records events in memory and can be told to fail.
    #[derive(Default)]
    struct RecordingJournal {
        events: Mutex<Vec<(String, u32, JournalEvent)>>,
        fail: bool,
        destroyed: Mutex<Vec<(String, u32)>>,
    }

    impl EventJournal for RecordingJournal {
        fn write(&self, map: &str, partition_id: u32, event: JournalEvent) -> anyhow::Result<u64> {
            if self.fail {
                anyhow::bail!("journal full");
            }
            let mut events = self.events.lock();
            events.push((map.to_string(), partition_id, event));
            Ok(events.len() as u64 - 1)
        }

        fn destroy(&self, map: &str, partition_id: u32) {
            self.destroyed.lock().push((map.to_string(), partition_id));
        }
    }

    struct FailingInitializer;

    impl MetadataInitializer for FailingInitializer {
        fn create_from_value(&self, _: &RecordValue) -> anyhow::Result<Option<Value>> {
            anyhow::bail!("not a document")
        }
    }

    fn key() -> Data {
        Data::from(vec![1])
    }

    fn map_value(fields: &[&str]) -> RecordValue {
        let mut map = BTreeMap::new();
        for f in fields {
            map.insert((*f).to_string(), Value::Int(1));
        }
        RecordValue::Object(Value::Map(map))
    }

    fn record(value: RecordValue) -> Record {
        Record::new(key(), value, 1000)
    }

    fn structured() -> Arc<dyn MetadataInitializer> {
        Arc::new(StructuredMetadataInitializer::new(Arc::new(MsgPackSerializationService)))
    }

    #[test]
    fn empty_composite_does_not_fail() {
        let composite = CompositeMutationObserver::default();
        let mut rec = record(map_value(&["a"]));
        let value = map_value(&["b"]);

        assert!(composite.on_put(&key(), &mut rec).is_ok());
        assert!(composite.on_update(&key(), &mut rec, &value, &value).is_ok());
        assert!(composite.on_remove(&key(), &rec).is_ok());
        assert!(composite.on_remove_all(&[rec.clone()]).is_ok());
        assert!(composite.on_evict(&key(), &rec).is_ok());
        assert!(composite.on_load(&key(), &mut rec).is_ok());
        composite.on_destroy();
        assert!(composite.is_empty());
    }

    #[test]
    fn journal_observer_records_each_mutation_kind() {
        let journal = Arc::new(RecordingJournal::default());
        let composite = CompositeMutationObserver::new(vec![MutationObserver::EventJournal(
            EventJournalObserver::new(Arc::clone(&journal) as Arc<dyn EventJournal>, "orders", 3),
        )]);
        let old = RecordValue::Object(Value::Int(1));
        let new = RecordValue::Object(Value::Int(2));
        let mut rec = record(old.clone());

        composite.on_put(&key(), &mut rec).unwrap();
        composite.on_update(&key(), &mut rec, &old, &new).unwrap();
        composite.on_remove(&key(), &rec).unwrap();
        composite.on_evict(&key(), &rec).unwrap();
        composite.on_load(&key(), &mut rec).unwrap();
        composite.on_destroy();

        let events = journal.events.lock();
        let kinds: Vec<JournalEventType> = events.iter().map(|(_, _, e)| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                JournalEventType::Added,
                JournalEventType::Updated,
                JournalEventType::Removed,
                JournalEventType::Evicted,
                JournalEventType::Loaded,
            ]
        );
        assert!(events.iter().all(|(m, p, _)| m == "orders" && *p == 3));
        assert_eq!(events[1].2.old_value, Some(old));
        assert_eq!(events[1].2.new_value, Some(new));
        assert_eq!(journal.destroyed.lock().as_slice(), &[("orders".to_string(), 3)]);
    }

    #[test]
    fn metadata_observer_tracks_new_value_on_update() {
        let composite = CompositeMutationObserver::new(vec![MutationObserver::Metadata(
            MetadataObserver::new(structured()),
        )]);
        let mut rec = record(map_value(&["id", "total"]));

        composite.on_put(&key(), &mut rec).unwrap();
        assert_eq!(
            rec.attached_metadata,
            Some(fields_metadata(vec!["id".into(), "total".into()]))
        );

        composite
            .on_update(&key(), &mut rec, &map_value(&["id"]), &map_value(&["status"]))
            .unwrap();
        assert_eq!(
            rec.attached_metadata,
            Some(fields_metadata(vec!["status".into()]))
        );
    }

    #[test]
    fn metadata_failures_clear_metadata_without_failing() {
        let composite = CompositeMutationObserver::new(vec![MutationObserver::Metadata(
            MetadataObserver::new(Arc::new(FailingInitializer)),
        )]);
        let mut rec = record(map_value(&["a"]));
        rec.attached_metadata = Some(Value::Null);

        assert!(composite.on_put(&key(), &mut rec).is_ok());
        assert_eq!(rec.attached_metadata, None);
    }

    #[test]
    fn journal_failure_stops_broadcast() {
        let failing = Arc::new(RecordingJournal {
            fail: true,
            ..RecordingJournal::default()
        });
        let composite = CompositeMutationObserver::new(vec![
            MutationObserver::EventJournal(EventJournalObserver::new(failing, "m", 0)),
            MutationObserver::Metadata(MetadataObserver::new(structured())),
        ]);
        let mut rec = record(map_value(&["a"]));

        let err = composite.on_put(&key(), &mut rec).unwrap_err();
        assert_eq!(err.to_string(), "journal full");
        assert_eq!(rec.attached_metadata, None);
    }

    #[test]
    fn remove_all_journals_every_record() {
        let journal = Arc::new(RingBufferEventJournal::new(16));
        let mut composite = CompositeMutationObserver::default();
        composite.add(MutationObserver::EventJournal(EventJournalObserver::new(
            Arc::clone(&journal) as Arc<dyn EventJournal>,
            "m",
            0,
        )));
        let records: Vec<Record> = (0..3_u8)
            .map(|i| Record::new(Data::from(vec![i]), map_value(&["x"]), 0))
            .collect();

        composite.on_remove_all(&records).unwrap();

        let events = journal.read_from("m", 0, 0);
        assert_eq!(events.len(), 3);
        assert!(events
            .iter()
            .all(|e| e.event_type == JournalEventType::Removed));
    }

    #[test]
    fn structured_initializer_reads_json_strings() {
        let init = structured();
        let json = RecordValue::Object(Value::from(r#"{"b": 1, "a": {"c": 2}}"#));
        assert_eq!(
            init.create_from_value(&json).unwrap(),
            Some(fields_metadata(vec!["a".into(), "b".into()]))
        );

        let plain = RecordValue::Object(Value::from("not json"));
        assert_eq!(init.create_from_value(&plain).unwrap(), None);
        assert_eq!(
            init.create_from_value(&RecordValue::Object(Value::Int(5))).unwrap(),
            None
        );
    }

    #[test]
    fn structured_initializer_decodes_binary_values() {
        let codec = MsgPackSerializationService;
        let mut map = BTreeMap::new();
        map.insert("qty".to_string(), Value::Int(3));
        let data = codec.to_data(&Value::Map(map)).unwrap();

        assert_eq!(
            structured()
                .create_from_value(&RecordValue::Binary(data))
                .unwrap(),
            Some(fields_metadata(vec!["qty".into()]))
        );
    }
}
