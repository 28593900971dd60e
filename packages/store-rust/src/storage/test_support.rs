//! Collaborator fakes shared by the storage tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mapstore_core::Data;
use parking_lot::Mutex;

use super::indexes::{IndexProvider, Indexes, OperationSource, QueryableEntry};
use super::map_store::MapStore;
use super::record::RecordValue;

/// In-memory [`MapStore`] that counts calls and can be switched to fail.
#[derive(Default)]
pub(crate) struct InMemoryMapStore {
    entries: Mutex<HashMap<Data, RecordValue>>,
    pub stores: AtomicUsize,
    pub deletes: AtomicUsize,
    pub batches: Mutex<Vec<usize>>,
    fail: AtomicBool,
    rewrite: Option<RecordValue>,
    post_processing: bool,
}

impl InMemoryMapStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A post-processing store that answers every write with `rewrite`.
    pub fn post_processing(rewrite: RecordValue) -> Arc<Self> {
        Arc::new(Self {
            rewrite: Some(rewrite),
            post_processing: true,
            ..Self::default()
        })
    }

    /// A store that hands `rewrite` back but does not declare post-processing.
    pub fn rewriting_without_flag(rewrite: RecordValue) -> Arc<Self> {
        Arc::new(Self {
            rewrite: Some(rewrite),
            ..Self::default()
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn get(&self, key: &Data) -> Option<RecordValue> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: Data, value: RecordValue) {
        self.entries.lock().insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            anyhow::bail!("external store unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl MapStore for InMemoryMapStore {
    async fn store(&self, key: &Data, value: &RecordValue) -> anyhow::Result<Option<RecordValue>> {
        self.check()?;
        self.stores.fetch_add(1, Ordering::Relaxed);
        let stored = self.rewrite.clone().unwrap_or_else(|| value.clone());
        self.entries.lock().insert(key.clone(), stored);
        Ok(self.rewrite.clone())
    }

    async fn store_all(&self, entries: &[(Data, RecordValue)]) -> anyhow::Result<()> {
        self.check()?;
        self.batches.lock().push(entries.len());
        let mut map = self.entries.lock();
        for (key, value) in entries {
            self.stores.fetch_add(1, Ordering::Relaxed);
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, key: &Data) -> anyhow::Result<()> {
        self.check()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn load(&self, key: &Data) -> anyhow::Result<Option<RecordValue>> {
        self.check()?;
        Ok(self.entries.lock().get(key).cloned())
    }

    fn is_post_processing(&self) -> bool {
        self.post_processing
    }
}

/// One call seen by [`CountingIndexes`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IndexCall {
    Put {
        key: Data,
        value: RecordValue,
        old_value: Option<RecordValue>,
        partition_id: u32,
    },
    Remove {
        key: Data,
        value: RecordValue,
    },
}

/// [`Indexes`] fake that records every call.
pub(crate) struct CountingIndexes {
    enabled: bool,
    pub calls: Mutex<Vec<IndexCall>>,
    pub checks: AtomicUsize,
}

impl CountingIndexes {
    pub fn new(enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            enabled,
            calls: Mutex::new(Vec::new()),
            checks: AtomicUsize::new(0),
        })
    }
}

impl Indexes for CountingIndexes {
    fn have_at_least_one_index(&self) -> bool {
        self.checks.fetch_add(1, Ordering::Relaxed);
        self.enabled
    }

    fn put_entry(
        &self,
        entry: &QueryableEntry<'_>,
        old_value: Option<&RecordValue>,
        source: OperationSource,
    ) {
        assert_eq!(source, OperationSource::User);
        self.calls.lock().push(IndexCall::Put {
            key: entry.key.clone(),
            value: entry.value.clone(),
            old_value: old_value.cloned(),
            partition_id: entry.store_adapter.partition_id(),
        });
    }

    fn remove_entry(&self, key: &Data, value: &RecordValue, source: OperationSource) {
        assert_eq!(source, OperationSource::User);
        self.calls.lock().push(IndexCall::Remove {
            key: key.clone(),
            value: value.clone(),
        });
    }
}

/// [`IndexProvider`] that hands every partition the same [`CountingIndexes`].
pub(crate) struct FixedIndexes(pub Arc<CountingIndexes>);

impl IndexProvider for FixedIndexes {
    fn indexes_for(&self, _map: &str, _partition_id: u32) -> Arc<dyn Indexes> {
        self.0.clone()
    }
}

/// Routes `tracing` output to the test harness. Set `RUST_LOG` to see it.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
