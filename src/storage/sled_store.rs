//! Durable `Store` implementation backed by `sled`, grounded on the
//! teacher's `storage/mod.rs` `AnalysisStorage` (one tree per aggregate,
//! keys and values round-tripped through JSON).

use super::{Store, StorageError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::Path;

pub struct SledStore<K, V> {
    tree: sled::Tree,
    _key: PhantomData<K>,
    _value: PhantomData<V>,
}

impl<K, V> SledStore<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    pub fn open(db: &sled::Db, tree_name: &str) -> Result<Self, StorageError> {
        let tree = db.open_tree(tree_name)?;
        Ok(Self {
            tree,
            _key: PhantomData,
            _value: PhantomData,
        })
    }

    pub fn open_at(path: impl AsRef<Path>, tree_name: &str) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::open(&db, tree_name)
    }

    fn encode_key(key: &K) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(key).map_err(StorageError::from)
    }
}

#[async_trait]
impl<K, V> Store<K, V> for SledStore<K, V>
where
    K: Serialize + DeserializeOwned + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn put(&self, key: K, value: V) -> Result<(), StorageError> {
        let key_bytes = Self::encode_key(&key)?;
        let value_bytes = serde_json::to_vec(&value)?;
        self.tree.insert(key_bytes, value_bytes)?;
        Ok(())
    }

    async fn get(&self, key: &K) -> Result<Option<V>, StorageError> {
        let key_bytes = Self::encode_key(key)?;
        match self.tree.get(key_bytes)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(StorageError::from)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &K) -> Result<(), StorageError> {
        let key_bytes = Self::encode_key(key)?;
        self.tree.remove(key_bytes)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<V>, StorageError> {
        self.tree
            .iter()
            .values()
            .map(|res| {
                let bytes = res?;
                serde_json::from_slice(&bytes).map_err(StorageError::from)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store: SledStore<String, Widget> = SledStore::open_at(dir.path(), "widgets").unwrap();
        let widget = Widget {
            name: "bolt".to_string(),
            count: 42,
        };
        store.put("bolt".to_string(), widget.clone()).await.unwrap();
        let fetched = store.get(&"bolt".to_string()).await.unwrap();
        assert_eq!(fetched, Some(widget));
    }

    #[tokio::test]
    async fn missing_key_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store: SledStore<String, Widget> = SledStore::open_at(dir.path(), "widgets").unwrap();
        assert_eq!(store.get(&"missing".to_string()).await.unwrap(), None);
    }
}
