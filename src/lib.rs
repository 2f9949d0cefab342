// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Offline Sync
//!
//! Offline cache and cross-device sync engine for a language-learning app.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         CacheStore                          │
//! │  • Generic key/value cache with TTL and priorities         │
//! │  • LRU / LFU / FIFO / smart eviction under budgets         │
//! │  • Change events, snapshot to storage                      │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ContentCacheManager                      │
//! │  • Passages, vocabulary, quizzes, cultural insights        │
//! │  • Scored trimming, offline sessions, analytics            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                 (finished sessions, analytics)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SyncQueue                           │
//! │  • Priority desc, then oldest first                        │
//! │  • Bounded, de-duplicated by idempotency key               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SyncEngine                          │
//! │  • Merges profile and progress mirrors                     │
//! │  • Uploads offline activity, drains the queue              │
//! │  • Single flight, cancellable, network aware               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All components persist through a [`storage::KvStorage`] backend
//! (in-memory or SQLite) and read time from an injectable
//! [`clock::Clock`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use offline_sync::{ContentCacheManager, OfflineConfig, SyncQueue};
//! use offline_sync::clock::SystemClock;
//! use offline_sync::content::{ContentItem, ContentKind, Passage, SessionType};
//! use offline_sync::storage::InMemoryStorage;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = OfflineConfig::default();
//!     let queue = Arc::new(SyncQueue::new(config.sync.max_queue_size));
//!     let content = ContentCacheManager::new(
//!         config.content.clone(),
//!         Arc::new(InMemoryStorage::new()),
//!         Arc::new(SystemClock),
//!         queue.clone(),
//!     );
//!     content.init().await;
//!
//!     let passage = Passage {
//!         id: "p1".into(),
//!         title: "En el mercado".into(),
//!         text: "Hoy vamos al mercado.".into(),
//!         ..Default::default()
//!     };
//!     content
//!         .cache_content(ContentKind::Passages, vec![ContentItem::Passage(passage)])
//!         .expect("cache");
//!
//!     let session = content.start_session(SessionType::Reading);
//!     content.end_session(&session);
//!     assert_eq!(queue.len(), 1);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: Generic [`CacheStore`]
//! - [`content`]: [`ContentCacheManager`], sessions and analytics
//! - [`sync`]: [`SyncQueue`], merge policies and the [`SyncEngine`]
//! - [`model`]: Profile and progress documents
//! - [`storage`]: Key/value storage backends
//! - [`resilience`]: Retry with backoff and per-attempt timeouts

pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod content;
pub mod metrics;
pub mod model;
pub mod resilience;
pub mod storage;
pub mod sync;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use cache::{CacheError, CacheEvent, CacheStore, EvictionStrategy, Priority, SetOptions};
pub use config::{CacheConfig, ContentCacheConfig, OfflineConfig, SyncConfig};
pub use content::{ContentCacheManager, ContentError, ContentKind, OfflineSession, SessionType};
pub use model::{LearningProgress, UserProfile};
pub use resilience::retry::RetryConfig;
pub use storage::{InMemoryStorage, KvStorage, SqliteStorage, StorageError};
pub use sync::{
    SyncEngine, SyncError, SyncQueue, SyncQueueItem, SyncResult, SyncState, SyncTransport,
};
