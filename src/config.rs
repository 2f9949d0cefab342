//! Configuration for the offline cache and sync engine.
//!
//! # Example
//!
//! ```
//! use offline_sync::OfflineConfig;
//! use offline_sync::cache::EvictionStrategy;
//!
//! // Minimal config (uses defaults)
//! let config = OfflineConfig::default();
//! assert_eq!(config.cache.max_items, 1000);
//! assert_eq!(config.cache.strategy, EvictionStrategy::Smart);
//!
//! // Partial override from JSON; missing fields fall back to defaults
//! let config: OfflineConfig = serde_json::from_str(
//!     r#"{ "sync": { "max_queue_size": 20 }, "cache": { "strategy": "lru" } }"#
//! ).unwrap();
//! assert_eq!(config.sync.max_queue_size, 20);
//! assert_eq!(config.sync.max_attempts, 5);
//! assert_eq!(config.cache.strategy, EvictionStrategy::Lru);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::cache::EvictionStrategy;
use crate::resilience::retry::RetryConfig;

/// Top-level configuration owned by the application's composition root.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfflineConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub content: ContentCacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Limits and behaviour of a [`crate::cache::CacheStore`].
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Total size budget in bytes (default: 50 MB)
    #[serde(default = "default_max_size_bytes")]
    pub max_size_bytes: usize,

    /// Maximum number of entries
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// TTL applied when `set` is called without one (default: 24h)
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Background expiry sweep interval (default: 5 min)
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,

    #[serde(default)]
    pub strategy: EvictionStrategy,

    /// Buffered events per subscriber before lagging receivers drop events
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Storage key used by `persist`/`restore`
    #[serde(default = "default_snapshot_key")]
    pub snapshot_key: String,
}

fn default_max_size_bytes() -> usize { 50 * 1024 * 1024 } // 50 MB
fn default_max_items() -> usize { 1000 }
fn default_ttl_ms() -> u64 { 24 * 60 * 60 * 1000 }
fn default_cleanup_interval_ms() -> u64 { 5 * 60 * 1000 }
fn default_event_capacity() -> usize { 256 }
fn default_snapshot_key() -> String { "cache:snapshot".to_string() }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_max_size_bytes(),
            max_items: default_max_items(),
            default_ttl_ms: default_ttl_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            strategy: EvictionStrategy::default(),
            event_capacity: default_event_capacity(),
            snapshot_key: default_snapshot_key(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(1))
    }
}

/// Limits of the learning-content cache.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentCacheConfig {
    /// Items older than this are dropped on every trim
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default = "default_max_items_per_collection")]
    pub max_items_per_collection: usize,

    /// Per-collection size budget (default: 10 MB)
    #[serde(default = "default_max_collection_bytes")]
    pub max_collection_bytes: usize,

    /// Finished sessions kept for analytics
    #[serde(default = "default_max_recent_sessions")]
    pub max_recent_sessions: usize,

    /// Prefix for every storage key written by the content cache
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,
}

fn default_retention_days() -> u32 { 30 }
fn default_max_items_per_collection() -> usize { 500 }
fn default_max_collection_bytes() -> usize { 10 * 1024 * 1024 } // 10 MB
fn default_max_recent_sessions() -> usize { 50 }
fn default_storage_prefix() -> String { "content".to_string() }

impl Default for ContentCacheConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            max_items_per_collection: default_max_items_per_collection(),
            max_collection_bytes: default_max_collection_bytes(),
            max_recent_sessions: default_max_recent_sessions(),
            storage_prefix: default_storage_prefix(),
        }
    }
}

/// Sync engine and queue settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Drain passes an item may fail before it is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-request transport timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Backoff settings used inside a single attempt
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_retry_max_retries")]
    pub retry_max_retries: usize,

    /// Endpoint prefix handed to the transport
    #[serde(default = "default_endpoint_prefix")]
    pub endpoint_prefix: String,
}

fn default_max_queue_size() -> usize { 500 }
fn default_max_attempts() -> u32 { 5 }
fn default_request_timeout_ms() -> u64 { 10_000 }
fn default_retry_initial_delay_ms() -> u64 { 200 }
fn default_retry_max_delay_ms() -> u64 { 5_000 }
fn default_retry_max_retries() -> usize { 3 }
fn default_endpoint_prefix() -> String { "/api/sync".to_string() }

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_attempts: default_max_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_max_retries: default_retry_max_retries(),
            endpoint_prefix: default_endpoint_prefix(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Retry policy for one transport attempt.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            factor: 2.0,
            max_retries: Some(self.retry_max_retries.max(1)),
        }
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint_prefix.trim_end_matches('/'), path)
    }
}
