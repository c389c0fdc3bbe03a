//! Storage module for persisting collection state
//!
//! This module handles all persistence for the collector, including:
//! - The key/value store interface and its SQLite and in-memory backends
//! - Typed access to the collection run checkpoint
//! - Typed access to the persisted log ring

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyValueStore, StorageError, StorageResult};

use crate::model::{CollectionRun, LogEntry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Key holding the composite collection run checkpoint
pub const RUN_KEY: &str = "collectionRun";

/// Key holding the bounded operator log
pub const LOGS_KEY: &str = "extensionLogs";

/// Opens the durable store at `path`
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Arc<dyn KeyValueStore>)` - Successfully opened storage
/// * `Err(StorageError)` - Failed to open storage
pub fn open_storage(path: &Path) -> StorageResult<Arc<dyn KeyValueStore>> {
    Ok(Arc::new(SqliteStore::new(path)?))
}

/// Typed view over a key/value store
///
/// The run is stored as a single document so that a cursor advance and the
/// records it covers are always written together.
#[derive(Clone)]
pub struct RunStore {
    store: Arc<dyn KeyValueStore>,
}

impl RunStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Convenience constructor over a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn inner(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Loads the last checkpointed run, if any
    pub async fn load_run(&self) -> StorageResult<Option<CollectionRun>> {
        self.load(RUN_KEY).await
    }

    /// Writes a full checkpoint of `run`
    pub async fn save_run(&self, run: &CollectionRun) -> StorageResult<()> {
        self.save(RUN_KEY, run).await
    }

    /// Loads the persisted log entries, oldest first
    pub async fn load_logs(&self) -> StorageResult<Vec<LogEntry>> {
        Ok(self.load(LOGS_KEY).await?.unwrap_or_default())
    }

    pub async fn save_logs(&self, entries: &[LogEntry]) -> StorageResult<()> {
        self.save(LOGS_KEY, &entries).await
    }

    pub async fn clear_logs(&self) -> StorageResult<()> {
        self.store.remove(LOGS_KEY).await
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.store.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StorageError::Serialization {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> StorageResult<()> {
        let value = serde_json::to_value(value).map_err(|e| StorageError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.store.set(key, value).await
    }
}
