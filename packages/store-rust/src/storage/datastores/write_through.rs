//! Write-through [`MapDataStore`]: every mutation reaches the external
//! store before the record store commits it.

use std::sync::Arc;

use async_trait::async_trait;
use mapstore_core::Data;
use uuid::Uuid;

use crate::storage::map_data_store::MapDataStore;
use crate::storage::map_store::MapStore;
use crate::storage::record::RecordValue;

/// Synchronous delivery to a [`MapStore`].
///
/// Post-processing follows the wrapped store's own flag.
pub struct WriteThroughDataStore {
    store: Arc<dyn MapStore>,
}

impl WriteThroughDataStore {
    /// Wraps `store`.
    #[must_use]
    pub fn new(store: Arc<dyn MapStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MapDataStore for WriteThroughDataStore {
    async fn add(
        &self,
        key: &Data,
        value: &RecordValue,
        _expiration_time: i64,
        _now: i64,
        _txn_id: Option<Uuid>,
    ) -> anyhow::Result<RecordValue> {
        let returned = self.store.store(key, value).await?;
        if self.store.is_post_processing() {
            Ok(returned.unwrap_or_else(|| value.clone()))
        } else {
            Ok(value.clone())
        }
    }

    async fn remove(&self, key: &Data, _now: i64, _txn_id: Option<Uuid>) -> anyhow::Result<()> {
        self.store.delete(key).await
    }

    async fn load(&self, key: &Data) -> anyhow::Result<Option<RecordValue>> {
        self.store.load(key).await
    }

    async fn load_all(&self, keys: &[Data]) -> anyhow::Result<Vec<(Data, RecordValue)>> {
        self.store.load_all(keys).await
    }

    async fn remove_all(&self, keys: &[Data], _now: i64) -> anyhow::Result<()> {
        self.store.delete_all(keys).await
    }

    fn is_loadable(&self, _key: &Data) -> bool {
        true
    }

    fn pending_operation_count(&self) -> u64 {
        0
    }

    async fn soft_flush(&self) -> anyhow::Result<u64> {
        Ok(0)
    }

    async fn hard_flush(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn reset(&self) {}

    fn is_post_processing(&self) -> bool {
        self.store.is_post_processing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::InMemoryMapStore;

    fn key() -> Data {
        Data::from(vec![1])
    }

    fn value(b: u8) -> RecordValue {
        RecordValue::Binary(Data::from(vec![b]))
    }

    #[tokio::test]
    async fn writes_reach_the_store_immediately() {
        let store = InMemoryMapStore::new();
        let ds = WriteThroughDataStore::new(Arc::clone(&store) as Arc<dyn MapStore>);

        let returned = ds.add(&key(), &value(1), 0, 10, None).await.unwrap();
        assert_eq!(returned, value(1));
        assert_eq!(store.get(&key()), Some(value(1)));
        assert_eq!(ds.load(&key()).await.unwrap(), Some(value(1)));

        ds.remove(&key(), 20, None).await.unwrap();
        assert_eq!(store.len(), 0);
        assert_eq!(ds.flush_due(30).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn post_processing_store_value_is_returned() {
        let store = InMemoryMapStore::post_processing(value(9));
        let ds = WriteThroughDataStore::new(store);

        assert!(ds.is_post_processing());
        assert_eq!(ds.add(&key(), &value(1), 0, 10, None).await.unwrap(), value(9));
    }

    #[tokio::test]
    async fn returned_value_ignored_without_post_processing() {
        let store = InMemoryMapStore::rewriting_without_flag(value(9));
        let ds = WriteThroughDataStore::new(store);

        assert!(!ds.is_post_processing());
        assert_eq!(ds.add(&key(), &value(1), 0, 10, None).await.unwrap(), value(1));
    }

    #[tokio::test]
    async fn store_errors_propagate() {
        let store = InMemoryMapStore::new();
        store.set_failing(true);
        let ds = WriteThroughDataStore::new(store);

        let err = ds.add(&key(), &value(1), 0, 10, None).await.unwrap_err();
        assert_eq!(err.to_string(), "external store unavailable");
    }
}
