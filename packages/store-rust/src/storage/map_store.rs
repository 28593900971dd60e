//! User-supplied external store.
//!
//! A [`MapStore`] is the database, file or service a map persists to. The
//! record store never calls it directly; it is wrapped by a
//! [`MapDataStore`](super::MapDataStore) that decides between write-through
//! and write-behind delivery.

use async_trait::async_trait;
use mapstore_core::Data;

use super::record::RecordValue;

/// External persistence target for one map.
///
/// Used as `Arc<dyn MapStore>`.
#[async_trait]
pub trait MapStore: Send + Sync {
    /// Persists one entry.
    ///
    /// A post-processing store may return a rewritten value (for example
    /// with generated fields filled in). That value replaces the in-memory
    /// one only when [`is_post_processing`](Self::is_post_processing) is
    /// `true`.
    async fn store(&self, key: &Data, value: &RecordValue) -> anyhow::Result<Option<RecordValue>>;

    /// Persists a batch of entries.
    async fn store_all(&self, entries: &[(Data, RecordValue)]) -> anyhow::Result<()> {
        for (key, value) in entries {
            self.store(key, value).await?;
        }
        Ok(())
    }

    /// Deletes one entry.
    async fn delete(&self, key: &Data) -> anyhow::Result<()>;

    /// Deletes a batch of entries.
    async fn delete_all(&self, keys: &[Data]) -> anyhow::Result<()> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    /// Loads one entry. Returns `None` if the key does not exist.
    async fn load(&self, key: &Data) -> anyhow::Result<Option<RecordValue>>;

    /// Loads a batch of entries, skipping missing keys.
    async fn load_all(&self, keys: &[Data]) -> anyhow::Result<Vec<(Data, RecordValue)>> {
        let mut loaded = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.load(key).await? {
                loaded.push((key.clone(), value));
            }
        }
        Ok(loaded)
    }

    /// Whether values returned from [`store`](Self::store) must replace the
    /// in-memory value.
    fn is_post_processing(&self) -> bool {
        false
    }
}
