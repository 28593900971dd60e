//! Key-level locks for one (map, partition).
//!
//! A record store only asks its [`LockStore`] how many keys are locked and
//! whether a given key is locked (eviction skips locked keys). Acquiring and
//! releasing locks is the business of the lock service's own callers.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use mapstore_core::Data;
use parking_lot::Mutex;
use uuid::Uuid;

/// Service name under which map namespaces are registered.
pub const MAP_SERVICE_NAME: &str = "map";

/// Identifies the distributed object a lock store belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectNamespace {
    pub service: String,
    pub object_name: String,
}

impl ObjectNamespace {
    /// Namespace of the named map.
    #[must_use]
    pub fn for_map(name: &str) -> Self {
        Self {
            service: MAP_SERVICE_NAME.to_string(),
            object_name: name.to_string(),
        }
    }
}

/// Read side of a partition's lock table.
///
/// Used as `Arc<dyn LockStore>`.
pub trait LockStore: Send + Sync {
    /// Number of keys currently holding a lock.
    fn locked_entry_count(&self) -> usize;

    /// Whether `key` is locked by anyone.
    fn is_locked(&self, key: &Data) -> bool;
}

/// Creates and tears down lock stores.
pub trait LockService: Send + Sync {
    /// Returns the lock store for (partition, namespace), creating it if needed.
    fn create_lock_store(
        &self,
        partition_id: u32,
        namespace: &ObjectNamespace,
    ) -> Option<Arc<dyn LockStore>>;

    /// Releases the lock store for (partition, namespace).
    fn destroy_lock_store(&self, partition_id: u32, namespace: &ObjectNamespace);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LockHolder {
    owner: Uuid,
    reentrancy: u32,
}

/// Reentrant lock table for one (partition, namespace).
#[derive(Default)]
pub struct PartitionLockStore {
    locks: Mutex<HashMap<Data, LockHolder>>,
}

impl PartitionLockStore {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `key` for `owner`. Re-acquiring by the same owner bumps the
    /// reentrancy count. Returns `false` if another owner holds the lock.
    pub fn lock(&self, key: &Data, owner: Uuid) -> bool {
        let mut locks = self.locks.lock();
        match locks.get_mut(key) {
            Some(holder) if holder.owner == owner => {
                holder.reentrancy = holder.reentrancy.saturating_add(1);
                true
            }
            Some(_) => false,
            None => {
                locks.insert(
                    key.clone(),
                    LockHolder {
                        owner,
                        reentrancy: 1,
                    },
                );
                true
            }
        }
    }

    /// Releases one level of `owner`'s lock on `key`. Returns `false` if
    /// `owner` does not hold it.
    pub fn unlock(&self, key: &Data, owner: Uuid) -> bool {
        let mut locks = self.locks.lock();
        let Some(holder) = locks.get_mut(key) else {
            return false;
        };
        if holder.owner != owner {
            return false;
        }
        holder.reentrancy -= 1;
        if holder.reentrancy == 0 {
            locks.remove(key);
        }
        true
    }

    /// Drops the lock on `key` regardless of owner and reentrancy.
    pub fn force_unlock(&self, key: &Data) -> bool {
        self.locks.lock().remove(key).is_some()
    }

    /// Current owner of `key`, if locked.
    #[must_use]
    pub fn owner(&self, key: &Data) -> Option<Uuid> {
        self.locks.lock().get(key).map(|h| h.owner)
    }
}

impl LockStore for PartitionLockStore {
    fn locked_entry_count(&self) -> usize {
        self.locks.lock().len()
    }

    fn is_locked(&self, key: &Data) -> bool {
        self.locks.lock().contains_key(key)
    }
}

/// In-process lock service keeping one [`PartitionLockStore`] per
/// (partition, namespace).
#[derive(Default)]
pub struct DefaultLockService {
    stores: DashMap<(u32, ObjectNamespace), Arc<PartitionLockStore>>,
}

impl DefaultLockService {
    /// Creates a service with no lock stores.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete lock store, for callers that acquire and release locks.
    #[must_use]
    pub fn lock_store(
        &self,
        partition_id: u32,
        namespace: &ObjectNamespace,
    ) -> Option<Arc<PartitionLockStore>> {
        self.stores
            .get(&(partition_id, namespace.clone()))
            .map(|s| Arc::clone(&s))
    }
}

impl LockService for DefaultLockService {
    fn create_lock_store(
        &self,
        partition_id: u32,
        namespace: &ObjectNamespace,
    ) -> Option<Arc<dyn LockStore>> {
        let store = self
            .stores
            .entry((partition_id, namespace.clone()))
            .or_default()
            .clone();
        Some(store)
    }

    fn destroy_lock_store(&self, partition_id: u32, namespace: &ObjectNamespace) {
        self.stores.remove(&(partition_id, namespace.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> Data {
        Data::from(vec![b])
    }

    #[test]
    fn locks_are_reentrant_per_owner() {
        let store = PartitionLockStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.lock(&key(1), a));
        assert!(store.lock(&key(1), a));
        assert!(!store.lock(&key(1), b));
        assert_eq!(store.owner(&key(1)), Some(a));

        assert!(store.unlock(&key(1), a));
        assert!(store.is_locked(&key(1)));
        assert!(!store.unlock(&key(1), b));
        assert!(store.unlock(&key(1), a));
        assert!(!store.is_locked(&key(1)));
    }

    #[test]
    fn counts_locked_keys() {
        let store = PartitionLockStore::new();
        let owner = Uuid::new_v4();
        store.lock(&key(1), owner);
        store.lock(&key(1), owner);
        store.lock(&key(2), owner);
        assert_eq!(store.locked_entry_count(), 2);

        assert!(store.force_unlock(&key(1)));
        assert_eq!(store.locked_entry_count(), 1);
        assert!(!store.force_unlock(&key(1)));
    }

    #[test]
    fn service_shares_store_per_partition_and_namespace() {
        let service = DefaultLockService::new();
        let ns = ObjectNamespace::for_map("orders");
        let created = service.create_lock_store(3, &ns).unwrap();

        let concrete = service.lock_store(3, &ns).unwrap();
        concrete.lock(&key(1), Uuid::new_v4());
        assert_eq!(created.locked_entry_count(), 1);

        assert!(service.lock_store(4, &ns).is_none());
        assert!(service
            .lock_store(3, &ObjectNamespace::for_map("users"))
            .is_none());

        service.destroy_lock_store(3, &ns);
        assert!(service.lock_store(3, &ns).is_none());
    }
}
