// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::clock::{SharedClock, DAY_MS};
use crate::config::ContentCacheConfig;
use crate::metrics::{self, LatencyTimer};
use crate::storage::SharedStorage;
use crate::sync::keys;
use crate::sync::queue::{SyncPayload, SyncQueue, SyncQueueItem};

use super::analytics::{self, OfflineAnalytics};
use super::scoring;
use super::session::{Activity, OfflineSession, SessionType};
use super::types::{
    CachedContent, ContentItem, ContentKind, CulturalInsight, Passage, QuizQuestion,
    VocabularyItem,
};
use super::ContentError;

/// Queue priority for analytics uploads (below every session type).
const ANALYTICS_PRIORITY: u32 = 0;

/// Outcome of one [`ContentCacheManager::cache_content`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheReport {
    pub kind: ContentKind,
    /// Ids that were already cached
    pub merged: usize,
    pub newly_cached: usize,
    /// Items removed by retention or budget trimming
    pub trimmed: usize,
    /// Collection size after trimming
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub items: usize,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentCacheStats {
    pub collections: BTreeMap<ContentKind, CollectionStats>,
    pub recent_sessions: usize,
    pub open_session: Option<String>,
    pub pending_sync: usize,
}

#[derive(Default)]
struct SessionState {
    current: Option<OfflineSession>,
    recent: VecDeque<OfflineSession>,
}

/// Content cache plus session tracking.
///
/// State lives in memory; [`init`](Self::init) loads the persisted
/// collections and [`flush`](Self::flush) writes them back.
pub struct ContentCacheManager {
    config: ContentCacheConfig,
    storage: SharedStorage,
    clock: SharedClock,
    queue: Arc<SyncQueue>,
    collections: RwLock<HashMap<ContentKind, Vec<CachedContent>>>,
    sessions: Mutex<SessionState>,
    analytics: Mutex<Option<OfflineAnalytics>>,
    dirty: AtomicBool,
    disposed: AtomicBool,
}

impl ContentCacheManager {
    pub fn new(
        config: ContentCacheConfig,
        storage: SharedStorage,
        clock: SharedClock,
        queue: Arc<SyncQueue>,
    ) -> Self {
        Self {
            config,
            storage,
            clock,
            queue,
            collections: RwLock::new(HashMap::new()),
            sessions: Mutex::new(SessionState::default()),
            analytics: Mutex::new(None),
            dirty: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    fn collection_key(&self, kind: ContentKind) -> String {
        format!("{}:{}", self.config.storage_prefix, kind)
    }

    fn sessions_key(&self) -> String {
        format!("{}:sessions", self.config.storage_prefix)
    }

    fn analytics_key(&self) -> String {
        format!("{}:analytics", self.config.storage_prefix)
    }

    fn retention_ms(&self) -> i64 {
        i64::from(self.config.retention_days) * DAY_MS
    }

    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Load persisted collections and session history.
    ///
    /// Unreadable or corrupt keys are logged and treated as empty. Returns
    /// the number of content items loaded.
    pub async fn init(&self) -> usize {
        let mut loaded = HashMap::new();
        let mut total = 0;
        for kind in ContentKind::ALL {
            let items: Vec<CachedContent> = self
                .load::<Vec<CachedContent>>(&self.collection_key(kind))
                .await
                .unwrap_or_default()
                .into_iter()
                .filter(|c| c.item.kind() == kind)
                .collect();
            total += items.len();
            loaded.insert(kind, items);
        }
        let recent: Vec<OfflineSession> = self.load(&self.sessions_key()).await.unwrap_or_default();
        let last_analytics: Option<OfflineAnalytics> = self.load(&self.analytics_key()).await;

        *self.collections.write() = loaded;
        {
            let mut sessions = self.sessions.lock();
            sessions.recent = recent.into_iter().collect();
            while sessions.recent.len() > self.config.max_recent_sessions {
                sessions.recent.pop_front();
            }
        }
        *self.analytics.lock() = last_analytics;

        info!(items = total, "Content cache loaded");
        total
    }

    async fn load<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        match self.storage.read(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "Corrupt content cache entry, ignoring");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Content cache read failed, continuing in memory");
                metrics::record_storage_error("content_read");
                None
            }
        }
    }

    /// Write every collection, the session history, the last analytics
    /// snapshot and the shared sync queue in one batch. Returns the number
    /// of keys written.
    ///
    /// The queue goes under the key [`SyncEngine::init`] restores from, so
    /// sessions ended offline survive a restart.
    ///
    /// [`SyncEngine::init`]: crate::sync::SyncEngine::init
    pub async fn flush(&self) -> Result<usize, ContentError> {
        let _timer = LatencyTimer::new("content", "flush");
        let mut batch = Vec::with_capacity(ContentKind::ALL.len() + 2);
        {
            let collections = self.collections.read();
            for kind in ContentKind::ALL {
                let items = collections.get(&kind).map(Vec::as_slice).unwrap_or(&[]);
                batch.push((self.collection_key(kind), serde_json::to_vec(items)?));
            }
        }
        {
            let sessions = self.sessions.lock();
            let recent: Vec<&OfflineSession> = sessions.recent.iter().collect();
            batch.push((self.sessions_key(), serde_json::to_vec(&recent)?));
        }
        if let Some(snapshot) = self.analytics.lock().as_ref() {
            batch.push((self.analytics_key(), serde_json::to_vec(snapshot)?));
        }
        batch.push((
            keys::SYNC_QUEUE.to_string(),
            serde_json::to_vec(&self.queue.to_snapshot())?,
        ));

        let written = self.storage.write_many(&batch).await.map_err(|e| {
            metrics::record_storage_error("content_flush");
            e
        })?;
        self.dirty.store(false, Ordering::Release);
        debug!(keys = written, "Content cache flushed");
        Ok(written)
    }

    /// True when memory has changes not yet written by [`flush`](Self::flush).
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Close the open session (queueing it) and reject further caching.
    pub fn dispose(&self) -> Option<OfflineSession> {
        self.disposed.store(true, Ordering::Release);
        let now = self.clock.now_millis();
        let mut state = self.sessions.lock();
        let open = state.current.take()?;
        Some(self.finalize_locked(&mut state, open, now))
    }

    /// Drop every collection, session and analytics snapshot, in memory
    /// and in storage.
    pub async fn clear_all(&self) -> Result<(), ContentError> {
        self.collections.write().clear();
        *self.sessions.lock() = SessionState::default();
        *self.analytics.lock() = None;
        self.dirty.store(false, Ordering::Release);

        let mut keys: Vec<String> = ContentKind::ALL
            .iter()
            .map(|k| self.collection_key(*k))
            .collect();
        keys.push(self.sessions_key());
        keys.push(self.analytics_key());
        for key in &keys {
            self.storage.remove(key).await?;
        }
        info!("Content cache cleared");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // CONTENT
    // ═══════════════════════════════════════════════════════════════════════

    /// Merge `items` into the `kind` collection, then trim it.
    ///
    /// Every item must belong to `kind`; the batch is validated before any
    /// state changes.
    pub fn cache_content(
        &self,
        kind: ContentKind,
        items: Vec<ContentItem>,
    ) -> Result<CacheReport, ContentError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(ContentError::Disposed);
        }
        let _timer = LatencyTimer::new("content", "cache");

        let mut sized = Vec::with_capacity(items.len());
        for item in items {
            if item.kind() != kind {
                return Err(ContentError::KindMismatch {
                    id: item.id().to_string(),
                    expected: kind,
                    found: item.kind(),
                });
            }
            let size = serde_json::to_vec(&item)?.len();
            sized.push((item, size));
        }

        let now = self.clock.now_millis();
        let mut collections = self.collections.write();
        let collection = collections.entry(kind).or_default();

        let mut merged = 0;
        let mut newly_cached = 0;
        for (item, size_bytes) in sized {
            match collection.iter_mut().find(|c| c.item.id() == item.id()) {
                Some(existing) => {
                    existing.item = item;
                    existing.size_bytes = size_bytes;
                    existing.cached_at = now;
                    existing.access_count += 1;
                    existing.last_accessed = now;
                    existing.newly_cached = false;
                    merged += 1;
                }
                None => {
                    collection.push(CachedContent {
                        item,
                        cached_at: now,
                        last_accessed: now,
                        access_count: 0,
                        priority_score: 0.0,
                        size_bytes,
                        newly_cached: true,
                    });
                    newly_cached += 1;
                }
            }
        }

        let trimmed = self.trim(collection, now);
        let total = collection.len();
        drop(collections);
        self.dirty.store(true, Ordering::Release);

        metrics::record_content_cached(kind.as_str(), merged + newly_cached, trimmed);
        debug!(%kind, merged, newly_cached, trimmed, total, "Content cached");
        Ok(CacheReport {
            kind,
            merged,
            newly_cached,
            trimmed,
            total,
        })
    }

    /// Drop expired items, rescore, and keep the best-scoring items that
    /// fit both budgets. Returns how many items were removed.
    fn trim(&self, collection: &mut Vec<CachedContent>, now: i64) -> usize {
        let before = collection.len();
        let retention = self.retention_ms();
        collection.retain(|c| now - c.cached_at <= retention);

        for content in collection.iter_mut() {
            content.priority_score = scoring::priority_score(content, now);
        }
        collection.sort_by(|a, b| {
            b.priority_score
                .total_cmp(&a.priority_score)
                .then_with(|| b.cached_at.cmp(&a.cached_at))
                .then_with(|| a.item.id().cmp(b.item.id()))
        });

        let mut bytes = 0;
        let mut kept = Vec::with_capacity(collection.len());
        for content in collection.drain(..) {
            if kept.len() < self.config.max_items_per_collection
                && bytes + content.size_bytes <= self.config.max_collection_bytes
            {
                bytes += content.size_bytes;
                kept.push(content);
            }
        }
        *collection = kept;
        before - collection.len()
    }

    /// Cached entries of `kind` with their bookkeeping, best score first.
    pub fn get_cached_entries(&self, kind: ContentKind) -> Vec<CachedContent> {
        let now = self.clock.now_millis();
        let retention = self.retention_ms();
        let entries: Vec<CachedContent> = self
            .collections
            .read()
            .get(&kind)
            .map(|items| {
                items
                    .iter()
                    .filter(|c| now - c.cached_at <= retention)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        metrics::record_content_read(kind.as_str(), entries.len());
        entries
    }

    /// Cached items of `kind`, best score first. Never fails; an empty or
    /// unloaded collection yields an empty vector.
    pub fn get_cached_content(&self, kind: ContentKind) -> Vec<ContentItem> {
        self.get_cached_entries(kind)
            .into_iter()
            .map(|c| c.item)
            .collect()
    }

    pub fn get_cached_passages(&self) -> Vec<Passage> {
        self.typed(ContentKind::Passages, |item| match item {
            ContentItem::Passage(p) => Some(p),
            _ => None,
        })
    }

    pub fn get_cached_vocabulary(&self) -> Vec<VocabularyItem> {
        self.typed(ContentKind::Vocabulary, |item| match item {
            ContentItem::Vocabulary(v) => Some(v),
            _ => None,
        })
    }

    pub fn get_cached_quiz_questions(&self) -> Vec<QuizQuestion> {
        self.typed(ContentKind::QuizQuestions, |item| match item {
            ContentItem::Quiz(q) => Some(q),
            _ => None,
        })
    }

    pub fn get_cached_cultural_insights(&self) -> Vec<CulturalInsight> {
        self.typed(ContentKind::CulturalInsights, |item| match item {
            ContentItem::Cultural(c) => Some(c),
            _ => None,
        })
    }

    fn typed<V>(&self, kind: ContentKind, pick: impl Fn(ContentItem) -> Option<V>) -> Vec<V> {
        self.get_cached_content(kind).into_iter().filter_map(pick).collect()
    }

    /// Count a read of `id`. Returns false if it is not cached.
    pub fn record_access(&self, kind: ContentKind, id: &str) -> bool {
        let now = self.clock.now_millis();
        let mut collections = self.collections.write();
        let Some(content) = collections
            .get_mut(&kind)
            .and_then(|items| items.iter_mut().find(|c| c.item.id() == id))
        else {
            return false;
        };
        content.access_count += 1;
        content.last_accessed = now;
        content.priority_score = scoring::priority_score(content, now);
        self.dirty.store(true, Ordering::Release);
        true
    }

    // ═══════════════════════════════════════════════════════════════════════
    // SESSIONS
    // ═══════════════════════════════════════════════════════════════════════

    /// Open a new session, closing (and queueing) any open one first.
    pub fn start_session(&self, session_type: SessionType) -> String {
        let now = self.clock.now_millis();
        let session_id = format!("session_{}", uuid::Uuid::new_v4().simple());

        let mut state = self.sessions.lock();
        if let Some(previous) = state.current.take() {
            debug!(session_id = %previous.session_id, "Closing open session before starting a new one");
            self.finalize_locked(&mut state, previous, now);
        }
        state.current = Some(OfflineSession::new(session_id.clone(), session_type, now));

        metrics::record_session(session_type.as_str(), "start");
        info!(%session_id, %session_type, "Offline session started");
        session_id
    }

    /// Append `activity` to the open session.
    ///
    /// Returns false, without error, when `session_id` is not the open session.
    pub fn update_session(&self, session_id: &str, activity: Activity) -> bool {
        let mut state = self.sessions.lock();
        match state.current.as_mut() {
            Some(session) if session.session_id == session_id => {
                session.record(activity);
                true
            }
            _ => {
                debug!(session_id, "Activity for a session that is not open, ignoring");
                false
            }
        }
    }

    /// Finish the open session and queue it for sync.
    ///
    /// The queue is in memory until the next [`flush`](Self::flush) or
    /// `SyncEngine::persist_queue`.
    pub fn end_session(&self, session_id: &str) -> Option<OfflineSession> {
        let now = self.clock.now_millis();
        let mut state = self.sessions.lock();
        if state.current.as_ref()?.session_id != session_id {
            return None;
        }
        let session = state.current.take()?;
        Some(self.finalize_locked(&mut state, session, now))
    }

    fn finalize_locked(
        &self,
        state: &mut SessionState,
        mut session: OfflineSession,
        now: i64,
    ) -> OfflineSession {
        session.finish(now);

        match SyncQueueItem::new(
            SyncPayload::Session(session.clone()),
            session.priority_level,
            now,
        ) {
            Ok(item) => {
                let size_kb = item.size_bytes as f64 / 1024.0;
                let cost = 1.0 + session.activities.len() as f64 / 10.0 + size_kb / 10.0;
                if !self.queue.enqueue(item.with_cost(cost)) {
                    warn!(session_id = %session.session_id, "Sync queue full, session not queued");
                }
            }
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Failed to serialize session for sync");
            }
        }

        state.recent.push_back(session.clone());
        while state.recent.len() > self.config.max_recent_sessions {
            state.recent.pop_front();
        }
        self.dirty.store(true, Ordering::Release);

        metrics::record_session(session.session_type.as_str(), "end");
        info!(
            session_id = %session.session_id,
            activities = session.activities.len(),
            duration_seconds = session.duration_seconds.unwrap_or(0),
            "Offline session ended"
        );
        session
    }

    pub fn current_session(&self) -> Option<OfflineSession> {
        self.sessions.lock().current.clone()
    }

    /// Finished sessions, oldest first.
    pub fn recent_sessions(&self) -> Vec<OfflineSession> {
        self.sessions.lock().recent.iter().cloned().collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ANALYTICS & STATS
    // ═══════════════════════════════════════════════════════════════════════

    /// Aggregate finished sessions that started within `window`.
    pub fn collect_analytics(&self, window: Duration) -> OfflineAnalytics {
        let now = self.clock.now_millis();
        let sessions = self.recent_sessions();
        let snapshot = {
            let collections = self.collections.read();
            analytics::collect(&sessions, collections.values().flatten(), now, window)
        };
        *self.analytics.lock() = Some(snapshot.clone());
        self.dirty.store(true, Ordering::Release);
        snapshot
    }

    /// Queue the last collected analytics snapshot for upload.
    ///
    /// Returns false if nothing has been collected yet or the queue rejected it.
    pub fn enqueue_analytics(&self) -> bool {
        let Some(snapshot) = self.analytics.lock().clone() else {
            return false;
        };
        let now = self.clock.now_millis();
        match SyncQueueItem::new(SyncPayload::Analytics(snapshot), ANALYTICS_PRIORITY, now) {
            Ok(item) => self.queue.enqueue(item),
            Err(e) => {
                warn!(error = %e, "Failed to serialize analytics for sync");
                false
            }
        }
    }

    pub fn cache_stats(&self) -> ContentCacheStats {
        let collections = ContentKind::ALL
            .into_iter()
            .map(|kind| {
                let entries = self.collections.read();
                let stats = entries
                    .get(&kind)
                    .map(|items| CollectionStats {
                        items: items.len(),
                        bytes: items.iter().map(|c| c.size_bytes).sum(),
                    })
                    .unwrap_or_default();
                (kind, stats)
            })
            .collect();
        let state = self.sessions.lock();
        ContentCacheStats {
            collections,
            recent_sessions: state.recent.len(),
            open_session: state.current.as_ref().map(|s| s.session_id.clone()),
            pending_sync: self.queue.pending().len(),
        }
    }
}
