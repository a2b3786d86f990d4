//! Per-aggregate persistence (spec §6 "Persisted state layout").
//!
//! The spec describes the persisted layout as "logical, not prescriptive
//! of engine" — it names the tables, not a database. Rather than pull in
//! a SQL driver whose compile-time query macros this exercise can never
//! verify against a live database, persistence is a narrow `Store<K, V>`
//! trait, generalized from the teacher's `storage/persistence.rs`
//! `PersistenceLayer` trait and its `InMemoryDAL` implementation. A
//! `sled`-backed implementation gives durability across restarts the same
//! way the teacher's `storage/mod.rs` `AnalysisStorage` does for its
//! timestamp-keyed append logs.

mod error;
pub mod memory;
pub mod sled_store;

pub use error::StorageError;

use async_trait::async_trait;

/// A per-aggregate key/value store. One instantiation per aggregate type
/// (downtime events, OEE readings, Andon events, ...) rather than one
/// store covering every entity, matching §6's per-table layout.
#[async_trait]
pub trait Store<K, V>: Send + Sync
where
    K: Send + Sync,
    V: Send + Sync,
{
    async fn put(&self, key: K, value: V) -> Result<(), StorageError>;
    async fn get(&self, key: &K) -> Result<Option<V>, StorageError>;
    async fn delete(&self, key: &K) -> Result<(), StorageError>;
    async fn list(&self) -> Result<Vec<V>, StorageError>;
}
