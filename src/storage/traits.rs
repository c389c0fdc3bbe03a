//! Storage traits and error types
//!
//! This module defines the key/value interface every storage backend implements
//! and the associated error types.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error for key '{key}': {message}")]
    Serialization { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for key/value storage backends
///
/// Values are JSON documents. Implementations must be safe to share between
/// tasks; each call is a complete write, so the last `set` for a key wins.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, or `None` if absent
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Removes `key`; removing an absent key is not an error
    async fn remove(&self, key: &str) -> StorageResult<()>;

    /// Removes every key
    async fn clear(&self) -> StorageResult<()>;
}
