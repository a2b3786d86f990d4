//! In-memory `Store` implementation — grounded on the teacher's
//! `storage/persistence.rs` `InMemoryDAL`, used for tests and for
//! aggregates that don't need durability (e.g. ephemeral connection
//! state).

use super::{Store, StorageError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::hash::Hash;

#[derive(Debug, Default)]
pub struct InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, V>,
}

impl<K, V> InMemoryStore<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl<K, V> Store<K, V> for InMemoryStore<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn put(&self, key: K, value: V) -> Result<(), StorageError> {
        self.entries.insert(key, value);
        Ok(())
    }

    async fn get(&self, key: &K) -> Result<Option<V>, StorageError> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn delete(&self, key: &K) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<V>, StorageError> {
        Ok(self.entries.iter().map(|r| r.value().clone()).collect())
    }
}
