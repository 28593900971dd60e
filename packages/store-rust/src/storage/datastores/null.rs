//! No-op [`MapDataStore`] implementation.
//!
//! [`NullDataStore`] discards all writes and returns empty results for reads.
//! It backs every map without a configured external store.

use async_trait::async_trait;
use mapstore_core::Data;
use uuid::Uuid;

use crate::storage::map_data_store::MapDataStore;
use crate::storage::record::RecordValue;

/// No-op `MapDataStore` for maps without persistence.
///
/// Writes succeed immediately and hand the value back unchanged.
/// Reads find nothing.
pub struct NullDataStore;

#[async_trait]
impl MapDataStore for NullDataStore {
    async fn add(
        &self,
        _key: &Data,
        value: &RecordValue,
        _expiration_time: i64,
        _now: i64,
        _txn_id: Option<Uuid>,
    ) -> anyhow::Result<RecordValue> {
        Ok(value.clone())
    }

    async fn remove(&self, _key: &Data, _now: i64, _txn_id: Option<Uuid>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn load(&self, _key: &Data) -> anyhow::Result<Option<RecordValue>> {
        Ok(None)
    }

    async fn load_all(&self, _keys: &[Data]) -> anyhow::Result<Vec<(Data, RecordValue)>> {
        Ok(Vec::new())
    }

    async fn remove_all(&self, _keys: &[Data], _now: i64) -> anyhow::Result<()> {
        Ok(())
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

    fn reset(&self) {
        // Nothing to reset: NullDataStore holds no state.
    }

    fn is_null(&self) -> bool {
        true
    }
}
