// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded outbound queue.
//!
//! Items are kept sorted by `(priority desc, created_at asc)`. When the
//! queue is over capacity the tail is truncated, so a full queue drops the
//! lowest-priority, newest items and never evicts a higher-priority item to
//! make room for a lower one.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::content::{OfflineAnalytics, OfflineSession};
use crate::metrics;
use crate::model::LearningProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Session,
    Progress,
    Analytics,
    UserContent,
}

impl DataType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Progress => "progress",
            Self::Analytics => "analytics",
            Self::UserContent => "user_content",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learner-authored content (notes, saved sentences) awaiting upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContent {
    pub content_id: String,
    pub content_type: String,
    pub body: String,
    pub updated_at: i64,
}

/// What a queue item carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SyncPayload {
    Session(OfflineSession),
    Progress(LearningProgress),
    Analytics(OfflineAnalytics),
    UserContent(UserContent),
}

impl SyncPayload {
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Session(_) => DataType::Session,
            Self::Progress(_) => DataType::Progress,
            Self::Analytics(_) => DataType::Analytics,
            Self::UserContent(_) => DataType::UserContent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: String,
    pub data_type: DataType,
    pub content: SyncPayload,
    pub priority: u32,
    pub created_at: i64,
    pub attempts: u32,
    #[serde(default)]
    pub last_attempt: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub estimated_sync_cost: f64,
    pub size_bytes: usize,
    /// Set once `attempts` reaches the configured maximum
    #[serde(default)]
    pub failed: bool,
    /// Hex SHA-256 of the serialized payload; stable across retries
    pub idempotency_key: String,
}

impl SyncQueueItem {
    /// Build a fresh item with zero attempts.
    ///
    /// The default cost is `1 + size_kb / 10`; callers with better
    /// knowledge override it with [`with_cost`](Self::with_cost).
    pub fn new(content: SyncPayload, priority: u32, now: i64) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(&content)?;
        let size_bytes = bytes.len();
        Ok(Self {
            id: format!("sync_{}", uuid::Uuid::new_v4().simple()),
            data_type: content.data_type(),
            content,
            priority,
            created_at: now,
            attempts: 0,
            last_attempt: None,
            error_message: None,
            estimated_sync_cost: 1.0 + size_bytes as f64 / 1024.0 / 10.0,
            size_bytes,
            failed: false,
            idempotency_key: idempotency_key(&bytes),
        })
    }

    #[must_use]
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.estimated_sync_cost = cost;
        self
    }
}

/// Hex SHA-256 of a request body.
#[must_use]
pub fn idempotency_key(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Thread-safe bounded priority queue, shared as `Arc<SyncQueue>`.
pub struct SyncQueue {
    max_size: usize,
    items: Mutex<Vec<SyncQueueItem>>,
}

impl SyncQueue {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild a queue from persisted items, re-applying order and bound.
    #[must_use]
    pub fn from_snapshot(max_size: usize, items: Vec<SyncQueueItem>) -> Self {
        let queue = Self::new(max_size);
        queue.replace_all(items);
        queue
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Insert `item` in order and truncate the tail.
    ///
    /// Returns whether the item is in the queue afterwards. An item whose
    /// payload is already queued (same idempotency key) is not duplicated
    /// and counts as accepted.
    pub fn enqueue(&self, item: SyncQueueItem) -> bool {
        let mut items = self.items.lock();
        if items
            .iter()
            .any(|i| !i.failed && i.idempotency_key == item.idempotency_key)
        {
            debug!(id = %item.id, data_type = %item.data_type, "Payload already queued");
            return true;
        }

        let id = item.id.clone();
        items.push(item);
        Self::sort(&mut items);
        let dropped = self.truncate(&mut items);
        metrics::set_queue_depth(items.len());

        !dropped.iter().any(|d| d == &id)
    }

    fn sort(items: &mut [SyncQueueItem]) {
        // Stable: equal keys keep insertion order
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
    }

    fn truncate(&self, items: &mut Vec<SyncQueueItem>) -> Vec<String> {
        if items.len() <= self.max_size {
            return Vec::new();
        }
        let dropped: Vec<SyncQueueItem> = items.drain(self.max_size..).collect();
        for item in &dropped {
            warn!(
                id = %item.id,
                data_type = %item.data_type,
                priority = item.priority,
                "Sync queue full, dropping item"
            );
            metrics::record_queue_drop(item.data_type.as_str());
        }
        dropped.into_iter().map(|i| i.id).collect()
    }

    /// Snapshot in drain order.
    pub fn items(&self) -> Vec<SyncQueueItem> {
        self.items.lock().clone()
    }

    /// Items still eligible for upload, in drain order.
    pub fn pending(&self) -> Vec<SyncQueueItem> {
        self.items.lock().iter().filter(|i| !i.failed).cloned().collect()
    }

    pub fn failed(&self) -> Vec<SyncQueueItem> {
        self.items.lock().iter().filter(|i| i.failed).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<SyncQueueItem> {
        self.items.lock().iter().find(|i| i.id == id).cloned()
    }

    /// Remove and return everything, in drain order.
    pub fn dequeue_all(&self) -> Vec<SyncQueueItem> {
        let items = std::mem::take(&mut *self.items.lock());
        metrics::set_queue_depth(0);
        items
    }

    pub fn remove(&self, id: &str) -> Option<SyncQueueItem> {
        let mut items = self.items.lock();
        let pos = items.iter().position(|i| i.id == id)?;
        let item = items.remove(pos);
        metrics::set_queue_depth(items.len());
        Some(item)
    }

    /// Count one attempt against `id`. Returns the new attempt count.
    pub fn record_attempt(&self, id: &str, error: Option<String>, now: i64) -> Option<u32> {
        let mut items = self.items.lock();
        let item = items.iter_mut().find(|i| i.id == id)?;
        item.attempts += 1;
        item.last_attempt = Some(now);
        item.error_message = error;
        Some(item.attempts)
    }

    /// Exclude `id` from further automatic retries.
    pub fn mark_failed(&self, id: &str) -> bool {
        let mut items = self.items.lock();
        match items.iter_mut().find(|i| i.id == id) {
            Some(item) => {
                item.failed = true;
                true
            }
            None => false,
        }
    }

    /// Replace the contents (used when restoring a persisted queue).
    pub fn replace_all(&self, mut restored: Vec<SyncQueueItem>) {
        Self::sort(&mut restored);
        let mut items = self.items.lock();
        *items = restored;
        self.truncate(&mut items);
        metrics::set_queue_depth(items.len());
    }

    pub fn to_snapshot(&self) -> Vec<SyncQueueItem> {
        self.items()
    }
}

impl fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncQueue")
            .field("max_size", &self.max_size)
            .field("len", &self.len())
            .finish()
    }
}
