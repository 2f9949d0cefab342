use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value collaborator.
///
/// Implemented by platform adapters (in-memory, SQLite file). The cache
/// store snapshots through it, the content cache keeps its collections in
/// it and the sync engine stores both device mirrors and the outbound queue.
#[async_trait]
pub trait KvStorage: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Write several keys. Default implementation falls back to sequential writes.
    async fn write_many(&self, entries: &[(String, Vec<u8>)]) -> Result<usize, StorageError> {
        for (key, bytes) in entries {
            self.write(key, bytes).await?;
        }
        Ok(entries.len())
    }
}

pub type SharedStorage = Arc<dyn KvStorage>;
