// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite key-value adapter.
//!
//! One table, one row per key:
//!
//! ```sql
//! CREATE TABLE kv_store (
//!     key TEXT PRIMARY KEY,
//!     value BLOB NOT NULL,
//!     updated_at INTEGER NOT NULL   -- epoch millis of the last write
//! );
//! ```

use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use super::traits::{KvStorage, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

pub struct SqliteStorage {
    pool: SqlitePool,
    location: String,
}

impl SqliteStorage {
    /// Open (or create) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let location = path.as_ref().to_string_lossy().to_string();
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = retry("sqlite_open", &RetryConfig::startup(), || async {
            SqlitePoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(5))
                .connect_with(options.clone())
                .await
                .map_err(|e| StorageError::Unavailable(e.to_string()))
        })
        .await?;

        info!(path = %location, "SQLite storage opened");
        let storage = Self { pool, location };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Private in-memory database (single connection so every query sees the same data).
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let storage = Self {
            pool,
            location: ":memory:".to_string(),
        };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("Failed to create kv_store table: {}", e)))?;

        Ok(())
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Number of stored keys.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM kv_store")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(n.max(0) as u64)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[async_trait]
impl KvStorage for SqliteStorage {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("read '{}' failed: {}", key, e)))?;

        match row {
            Some(row) => {
                let value: Vec<u8> = row
                    .try_get("value")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(bytes)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(format!("write '{}' failed: {}", key, e)))?;

        debug!(key, bytes = bytes.len(), "kv write");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("remove '{}' failed: {}", key, e)))?;
        Ok(())
    }

    async fn write_many(&self, entries: &[(String, Vec<u8>)]) -> Result<usize, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let now = now_millis();
        for (key, bytes) in entries {
            sqlx::query(
                "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(bytes.as_slice())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(format!("write '{}' failed: {}", key, e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(entries.len())
    }
}
