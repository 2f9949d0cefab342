// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::config::SyncConfig;
use crate::content::OfflineSession;
use crate::metrics;
use crate::model::{LearningProgress, UserProfile};
use crate::resilience::retry::{retry_with_timeout, AttemptError};
use crate::storage::SharedStorage;

use super::conflict::{count_profile_conflicts, count_progress_conflicts};
use super::merge::{merge_profiles, merge_progress};
use super::queue::{idempotency_key, SyncQueue, SyncQueueItem};
use super::transport::{OutboundRequest, SharedTransport, TransportError};
use super::types::{
    DataDomain, NetworkState, OfflineActivityBuffer, ProgressUpload, SyncError, SyncMeta,
    SyncResult, SyncState, SyncStatus,
};

/// Storage keys owned by the engine.
pub mod keys {
    pub const PROFILE_LOCAL: &str = "profile:local";
    pub const PROFILE_REMOTE: &str = "profile:remote";
    pub const PROGRESS_LOCAL: &str = "progress:local";
    pub const PROGRESS_REMOTE: &str = "progress:remote";
    pub const OFFLINE_ACTIVITY: &str = "offline_activity";
    pub const SYNC_QUEUE: &str = "sync_queue";
    pub const SYNC_META: &str = "sync_meta";
}

/// A document mirrored under a local and a remote key.
trait Mirrored: Serialize + DeserializeOwned + PartialEq + Clone + Send + Sync {
    const DOMAIN: DataDomain;
    const LOCAL_KEY: &'static str;
    const REMOTE_KEY: &'static str;

    fn merge(&self, other: &Self) -> Self;
    fn conflicts(&self, other: &Self) -> u32;
    fn record_count(&self) -> u32;
}

impl Mirrored for UserProfile {
    const DOMAIN: DataDomain = DataDomain::Profile;
    const LOCAL_KEY: &'static str = keys::PROFILE_LOCAL;
    const REMOTE_KEY: &'static str = keys::PROFILE_REMOTE;

    fn merge(&self, other: &Self) -> Self {
        merge_profiles(self, other)
    }

    fn conflicts(&self, other: &Self) -> u32 {
        count_profile_conflicts(self, other)
    }

    fn record_count(&self) -> u32 {
        (self.preferences.len() + self.achievements.len() + self.cultural_competency.len()) as u32
    }
}

impl Mirrored for LearningProgress {
    const DOMAIN: DataDomain = DataDomain::Progress;
    const LOCAL_KEY: &'static str = keys::PROGRESS_LOCAL;
    const REMOTE_KEY: &'static str = keys::PROGRESS_REMOTE;

    fn merge(&self, other: &Self) -> Self {
        merge_progress(self, other)
    }

    fn conflicts(&self, other: &Self) -> u32 {
        count_progress_conflicts(self, other)
    }

    fn record_count(&self) -> u32 {
        (self.vocabulary.len()
            + self.grammar.len()
            + self.reading_sessions.len()
            + self.quiz_sessions.len()) as u32
    }
}

/// Outcome of one queue drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub sent: u32,
    pub bytes: usize,
    /// Items marked failed during this pass
    pub failed: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
struct ActivityUpload {
    categories: u32,
    bytes: usize,
    errors: Vec<String>,
}

/// Holds a single-flight flag for the lifetime of a run.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Publishes `Syncing` while alive and `Idle` on drop, whatever the exit path.
struct StateGuard<'a> {
    state: &'a watch::Sender<SyncState>,
}

impl<'a> StateGuard<'a> {
    fn enter(state: &'a watch::Sender<SyncState>) -> Self {
        state.send_replace(SyncState::Syncing);
        Self { state }
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(SyncState::Idle);
    }
}

/// Cross-device synchronization engine.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use offline_sync::{SyncEngine, SyncQueue};
/// use offline_sync::clock::SystemClock;
/// use offline_sync::config::SyncConfig;
/// use offline_sync::storage::InMemoryStorage;
/// # use offline_sync::sync::{SyncTransport, OutboundRequest, TransportResponse, TransportError};
/// # struct Http;
/// # #[async_trait::async_trait]
/// # impl SyncTransport for Http {
/// #     async fn send(&self, _: &OutboundRequest) -> Result<TransportResponse, TransportError> {
/// #         Ok(TransportResponse::ok())
/// #     }
/// # }
///
/// # #[tokio::main]
/// # async fn main() {
/// let queue = Arc::new(SyncQueue::new(500));
/// let engine = SyncEngine::new(
///     SyncConfig::default(),
///     Arc::new(InMemoryStorage::new()),
///     Arc::new(Http),
///     Arc::new(SystemClock),
///     queue,
/// );
/// engine.init().await;
/// let results = engine.perform_full_sync().await.expect("sync");
/// assert_eq!(results.len(), 2);
/// # }
/// ```
pub struct SyncEngine {
    config: SyncConfig,
    storage: SharedStorage,
    transport: SharedTransport,
    clock: SharedClock,
    queue: Arc<SyncQueue>,

    state: watch::Sender<SyncState>,
    state_rx: watch::Receiver<SyncState>,

    syncing: AtomicBool,
    draining: AtomicBool,
    cancelled: AtomicBool,
    online: AtomicBool,

    meta: Mutex<SyncMeta>,
    activity: Mutex<OfflineActivityBuffer>,
}

impl SyncEngine {
    pub fn new(
        config: SyncConfig,
        storage: SharedStorage,
        transport: SharedTransport,
        clock: SharedClock,
        queue: Arc<SyncQueue>,
    ) -> Self {
        let (state, state_rx) = watch::channel(SyncState::Idle);
        Self {
            config,
            storage,
            transport,
            clock,
            queue,
            state,
            state_rx,
            syncing: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            online: AtomicBool::new(true),
            meta: Mutex::new(SyncMeta::default()),
            activity: Mutex::new(OfflineActivityBuffer::default()),
        }
    }

    /// Restore the persisted queue, sync metadata and offline activity.
    ///
    /// Persisted queue items are merged into whatever is already queued.
    /// Returns the number of queue items restored.
    pub async fn init(&self) -> usize {
        let restored: Vec<SyncQueueItem> = self.load(keys::SYNC_QUEUE).await.unwrap_or_default();
        let count = restored.len();
        for item in restored {
            self.queue.enqueue(item);
        }
        if let Some(meta) = self.load::<SyncMeta>(keys::SYNC_META).await {
            *self.meta.lock() = meta;
        }
        if let Some(buffer) = self.load::<OfflineActivityBuffer>(keys::OFFLINE_ACTIVITY).await {
            *self.activity.lock() = buffer;
        }
        info!(queue_items = count, "Sync engine restored");
        count
    }

    async fn load<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        match self.storage.read(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "Corrupt sync document, treating as absent");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Sync storage read failed, treating as absent");
                metrics::record_storage_error("sync_read");
                None
            }
        }
    }

    /// Write the queue to storage. Failures are logged; the in-memory
    /// queue stays authoritative.
    pub async fn persist_queue(&self) -> bool {
        let bytes = match serde_json::to_vec(&self.queue.to_snapshot()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to serialize sync queue");
                return false;
            }
        };
        match self.storage.write(keys::SYNC_QUEUE, &bytes).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Sync queue write failed, continuing in memory");
                metrics::record_storage_error("queue_persist");
                false
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // STATUS & CONTROL
    // ═══════════════════════════════════════════════════════════════════════

    pub fn status(&self) -> SyncStatus {
        let meta = self.meta.lock();
        SyncStatus {
            state: *self.state_rx.borrow(),
            last_sync: meta.last_sync,
            pending_conflicts: meta.last_conflicts,
            queue_len: self.queue.len(),
            network: self.network_state(),
        }
    }

    /// Watch for `Idle`/`Syncing` transitions.
    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Ask the running sync or drain to stop at its next suspension point.
    pub fn cancel(&self) {
        if self.is_syncing() || self.draining.load(Ordering::Acquire) {
            info!("Sync cancellation requested");
            self.cancelled.store(true, Ordering::Release);
        }
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    pub fn network_state(&self) -> NetworkState {
        if self.online.load(Ordering::Acquire) {
            NetworkState::Online
        } else {
            NetworkState::Offline
        }
    }

    pub fn set_network_state(&self, state: NetworkState) {
        self.online
            .store(state == NetworkState::Online, Ordering::Release);
    }

    /// Follow a network-state channel; every offline → online transition
    /// triggers [`drain_queue`](Self::drain_queue).
    ///
    /// The task holds a weak reference and ends when the engine is dropped
    /// or the sender side closes.
    pub fn watch_network(self: &Arc<Self>, mut rx: watch::Receiver<NetworkState>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut previous = *rx.borrow_and_update();
            if let Some(engine) = weak.upgrade() {
                engine.set_network_state(previous);
            }
            while rx.changed().await.is_ok() {
                let current = *rx.borrow_and_update();
                let Some(engine) = weak.upgrade() else { break };
                engine.set_network_state(current);
                if previous == NetworkState::Offline && current == NetworkState::Online {
                    info!(queue_len = engine.queue.len(), "Back online, draining sync queue");
                    if let Err(e) = engine.drain_queue().await {
                        warn!(error = %e, "Queue drain after reconnect failed");
                    }
                }
                previous = current;
            }
            debug!("Network watcher stopped");
        })
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUEUE & OFFLINE ACTIVITY
    // ═══════════════════════════════════════════════════════════════════════

    pub fn get_sync_queue(&self) -> Vec<SyncQueueItem> {
        self.queue.items()
    }

    pub async fn remove_from_queue(&self, id: &str) -> bool {
        let removed = self.queue.remove(id).is_some();
        if removed {
            self.persist_queue().await;
        }
        removed
    }

    /// Buffer a finished session for the next offline-activity upload.
    pub async fn record_offline_activity(&self, session: OfflineSession) -> Result<(), SyncError> {
        let snapshot = {
            let mut buffer = self.activity.lock();
            buffer.push(session);
            buffer.clone()
        };
        self.storage
            .write(keys::OFFLINE_ACTIVITY, &serde_json::to_vec(&snapshot)?)
            .await?;
        Ok(())
    }

    pub fn offline_activity(&self) -> OfflineActivityBuffer {
        self.activity.lock().clone()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FULL SYNC
    // ═══════════════════════════════════════════════════════════════════════

    /// Merge both device mirrors of profile and progress, upload offline
    /// activity and drain the queue.
    ///
    /// Returns one result for [`DataDomain::Profile`] and one for
    /// [`DataDomain::Progress`]. Fails fast with
    /// [`SyncError::AlreadySyncing`] when a run is in flight.
    #[tracing::instrument(skip(self))]
    pub async fn perform_full_sync(&self) -> Result<Vec<SyncResult>, SyncError> {
        let Some(_flight) = FlightGuard::acquire(&self.syncing) else {
            debug!("Full sync requested while one is running");
            return Err(SyncError::AlreadySyncing);
        };
        let _state = StateGuard::enter(&self.state);
        self.cancelled.store(false, Ordering::Release);

        let started = Instant::now();
        let outcome = self.run_full_sync().await;
        let status = match &outcome {
            Ok(results) if results.iter().all(|r| r.success) => "success",
            Ok(_) => "partial",
            Err(SyncError::Cancelled) => "cancelled",
            Err(_) => "error",
        };
        metrics::record_sync_run(status, started.elapsed());
        match &outcome {
            Ok(results) => info!(
                status,
                conflicts = results.iter().map(|r| r.conflicts_resolved).sum::<u32>(),
                duration_ms = started.elapsed().as_millis() as u64,
                "Full sync finished"
            ),
            Err(e) => warn!(status, error = %e, "Full sync aborted"),
        }
        outcome
    }

    async fn run_full_sync(&self) -> Result<Vec<SyncResult>, SyncError> {
        let (profile, _) = self.sync_mirrored::<UserProfile>().await?;
        let (mut progress, merged_progress) = self.sync_mirrored::<LearningProgress>().await?;

        if self.network_state() == NetworkState::Online {
            let stage = Instant::now();

            let upload = self.upload_offline_activity(merged_progress.as_ref()).await?;
            progress.metrics.items_synchronized += upload.categories;
            progress.metrics.data_transferred_kb += upload.bytes as f64 / 1024.0;
            for error in upload.errors {
                progress.fail(error);
            }

            let drain = self.drain_pass().await?;
            progress.metrics.items_synchronized += drain.sent;
            progress.metrics.data_transferred_kb += drain.bytes as f64 / 1024.0;
            for error in drain.errors {
                progress.fail(error);
            }
            progress.metrics.duration_ms += stage.elapsed().as_millis() as u64;
        } else {
            debug!(queue_len = self.queue.len(), "Offline, network stages skipped");
        }

        self.check_cancelled()?;
        let now = self.clock.now_millis();
        let meta = {
            let mut meta = self.meta.lock();
            meta.last_sync = Some(now);
            meta.runs += 1;
            meta.last_conflicts = profile.conflicts_resolved + progress.conflicts_resolved;
            for result in [&profile, &progress] {
                if result.data_merged {
                    meta.last_merged.insert(result.domain, now);
                }
            }
            meta.clone()
        };
        self.write_meta(&meta).await;

        Ok(vec![profile, progress])
    }

    async fn write_meta(&self, meta: &SyncMeta) {
        let written = match serde_json::to_vec(meta) {
            Ok(bytes) => self.storage.write(keys::SYNC_META, &bytes).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(error) = written {
            warn!(%error, "Failed to persist sync metadata");
            metrics::record_storage_error("sync_meta");
        }
    }

    /// Load both mirrors of `D`, merge, and write the result back to
    /// whichever mirror differs from it.
    async fn sync_mirrored<D: Mirrored>(&self) -> Result<(SyncResult, Option<D>), SyncError> {
        let started = Instant::now();
        let mut result = SyncResult::new(D::DOMAIN);

        self.check_cancelled()?;
        let local: Option<D> = self.load(D::LOCAL_KEY).await;
        self.check_cancelled()?;
        let remote: Option<D> = self.load(D::REMOTE_KEY).await;

        let (merged, conflicts) = match (&local, &remote) {
            (Some(l), Some(r)) => (l.merge(r), l.conflicts(r)),
            (Some(only), None) | (None, Some(only)) => (only.clone(), 0),
            (None, None) => {
                result.fail("no data");
                result.metrics.duration_ms = started.elapsed().as_millis() as u64;
                return Ok((result, None));
            }
        };

        result.conflicts_resolved = conflicts;
        result.metrics.conflicts_detected = conflicts;
        result.metrics.items_synchronized = merged.record_count();
        metrics::record_conflicts(D::DOMAIN.as_str(), conflicts);

        let bytes = serde_json::to_vec(&merged)?;
        let mut written = 0;
        for (key, current) in [(D::LOCAL_KEY, &local), (D::REMOTE_KEY, &remote)] {
            if current.as_ref() == Some(&merged) {
                continue;
            }
            self.check_cancelled()?;
            match self.storage.write(key, &bytes).await {
                Ok(()) => {
                    written += bytes.len();
                    result.data_merged = true;
                }
                Err(e) => {
                    warn!(key, error = %e, "Failed to persist merged document");
                    metrics::record_storage_error("sync_write");
                    result.fail(format!("failed to persist {}: {}", key, e));
                }
            }
        }

        result.metrics.data_transferred_kb = written as f64 / 1024.0;
        result.metrics.duration_ms = started.elapsed().as_millis() as u64;
        debug!(
            domain = %D::DOMAIN,
            conflicts,
            data_merged = result.data_merged,
            "Domain synchronized"
        );
        Ok((result, Some(merged)))
    }

    /// Upload buffered sessions per category. The buffer is cleared only if
    /// every category succeeds.
    async fn upload_offline_activity(
        &self,
        progress: Option<&LearningProgress>,
    ) -> Result<ActivityUpload, SyncError> {
        let buffer = self.activity.lock().clone();
        let mut upload = ActivityUpload::default();
        if buffer.is_empty() {
            return Ok(upload);
        }

        let categories = [
            ("vocabulary-sessions", serde_json::to_vec(&buffer.vocabulary_sessions)?, buffer.vocabulary_sessions.is_empty()),
            ("reading-sessions", serde_json::to_vec(&buffer.reading_sessions)?, buffer.reading_sessions.is_empty()),
            ("quiz-sessions", serde_json::to_vec(&buffer.quiz_sessions)?, buffer.quiz_sessions.is_empty()),
            (
                "progress",
                serde_json::to_vec(&ProgressUpload {
                    progress,
                    cultural_sessions: &buffer.cultural_sessions,
                })?,
                false,
            ),
        ];

        for (category, body, empty) in categories {
            if empty {
                continue;
            }
            self.check_cancelled()?;
            let request = OutboundRequest {
                endpoint: self.config.endpoint(category),
                idempotency_key: idempotency_key(&body),
                body,
            };
            match self.send(&request).await {
                Ok(()) => {
                    upload.categories += 1;
                    upload.bytes += request.body.len();
                }
                Err(e) => upload
                    .errors
                    .push(format!("offline activity '{}' failed: {}", category, e)),
            }
        }

        if upload.errors.is_empty() {
            self.clear_uploaded(&buffer).await;
        }
        Ok(upload)
    }

    /// Drop uploaded sessions, keeping any recorded during the upload.
    async fn clear_uploaded(&self, uploaded: &OfflineActivityBuffer) {
        let ids: BTreeSet<&str> = [
            &uploaded.vocabulary_sessions,
            &uploaded.reading_sessions,
            &uploaded.quiz_sessions,
            &uploaded.cultural_sessions,
        ]
        .into_iter()
        .flatten()
        .map(|s| s.session_id.as_str())
        .collect();

        let remaining = {
            let mut guard = self.activity.lock();
            let buffer = &mut *guard;
            for list in [
                &mut buffer.vocabulary_sessions,
                &mut buffer.reading_sessions,
                &mut buffer.quiz_sessions,
                &mut buffer.cultural_sessions,
            ] {
                list.retain(|s| !ids.contains(s.session_id.as_str()));
            }
            buffer.clone()
        };

        let written = match serde_json::to_vec(&remaining) {
            Ok(bytes) => self.storage.write(keys::OFFLINE_ACTIVITY, &bytes).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(error) = written {
            warn!(%error, "Failed to persist offline activity buffer");
            metrics::record_storage_error("activity_persist");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUEUE DRAIN
    // ═══════════════════════════════════════════════════════════════════════

    /// Send every pending queue item once.
    ///
    /// Success removes the item. Failure counts one attempt; at
    /// `max_attempts` the item is marked failed and excluded from further
    /// automatic retries. A drain already in flight makes this a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn drain_queue(&self) -> Result<DrainReport, SyncError> {
        if !self.is_syncing() {
            self.cancelled.store(false, Ordering::Release);
        }
        self.drain_pass().await
    }

    async fn drain_pass(&self) -> Result<DrainReport, SyncError> {
        let Some(_flight) = FlightGuard::acquire(&self.draining) else {
            debug!("Queue drain already running");
            return Ok(DrainReport::default());
        };

        let mut report = DrainReport::default();
        let result = self.drain_items(&mut report).await;
        self.persist_queue().await;

        if !report.failed.is_empty() {
            warn!(failed = report.failed.len(), "Queue items exhausted their attempts");
        }
        debug!(sent = report.sent, errors = report.errors.len(), "Queue drain finished");
        result.map(|()| report)
    }

    async fn drain_items(&self, report: &mut DrainReport) -> Result<(), SyncError> {
        for item in self.queue.pending() {
            self.check_cancelled()?;
            if self.network_state() == NetworkState::Offline {
                debug!("Went offline, stopping drain");
                break;
            }

            let request = OutboundRequest {
                endpoint: self.config.endpoint(item.data_type.as_str()),
                idempotency_key: item.idempotency_key.clone(),
                body: serde_json::to_vec(&item.content)?,
            };

            match self.send(&request).await {
                Ok(()) => {
                    self.queue.remove(&item.id);
                    report.sent += 1;
                    report.bytes += request.body.len();
                }
                Err(e) => {
                    let now = self.clock.now_millis();
                    let Some(attempts) = self.queue.record_attempt(&item.id, Some(e.to_string()), now)
                    else {
                        // Removed while in flight
                        continue;
                    };
                    if attempts >= self.config.max_attempts {
                        self.queue.mark_failed(&item.id);
                        report.failed.push(item.id.clone());
                        report.errors.push(format!(
                            "{} item {} failed after {} attempts: {}",
                            item.data_type, item.id, attempts, e
                        ));
                    } else {
                        report.errors.push(format!(
                            "{} item {} attempt {} failed: {}",
                            item.data_type, item.id, attempts, e
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// One logical request: per-attempt timeout plus backoff retries.
    async fn send(&self, request: &OutboundRequest) -> Result<(), AttemptError<TransportError>> {
        let outcome = retry_with_timeout(
            "sync_request",
            &self.config.retry_config(),
            self.config.request_timeout(),
            move || async move {
                let response = self.transport.send(request).await?;
                if response.success {
                    Ok::<(), TransportError>(())
                } else {
                    Err(TransportError::Rejected(
                        response.message.unwrap_or_else(|| "rejected".to_string()),
                    ))
                }
            },
        )
        .await;
        metrics::record_transport(
            &request.endpoint,
            if outcome.is_ok() { "success" } else { "error" },
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::content::SessionType;
    use crate::model::{Achievement, VocabularyProgress};
    use crate::storage::{InMemoryStorage, KvStorage};
    use crate::sync::queue::{SyncPayload, UserContent};
    use crate::sync::transport::{SyncTransport, TransportResponse};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct RecordingTransport {
        fail_endpoints: Mutex<Vec<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingTransport {
        fn fail(&self, endpoint: &str) {
            self.fail_endpoints.lock().push(endpoint.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl SyncTransport for RecordingTransport {
        async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
            self.calls.lock().push(request.endpoint.clone());
            if self.fail_endpoints.lock().contains(&request.endpoint) {
                return Err(TransportError::Network("connection reset".into()));
            }
            Ok(TransportResponse::ok())
        }
    }

    fn fast_config() -> SyncConfig {
        SyncConfig {
            max_attempts: 2,
            retry_initial_delay_ms: 1,
            retry_max_delay_ms: 2,
            retry_max_retries: 1,
            ..Default::default()
        }
    }

    struct Fixture {
        engine: Arc<SyncEngine>,
        storage: Arc<InMemoryStorage>,
        transport: Arc<RecordingTransport>,
        queue: Arc<SyncQueue>,
    }

    fn fixture() -> Fixture {
        let storage = Arc::new(InMemoryStorage::new());
        let transport = Arc::new(RecordingTransport::default());
        let queue = Arc::new(SyncQueue::new(100));
        let engine = Arc::new(SyncEngine::new(
            fast_config(),
            storage.clone(),
            transport.clone(),
            Arc::new(ManualClock::new(1_000)),
            queue.clone(),
        ));
        Fixture {
            engine,
            storage,
            transport,
            queue,
        }
    }

    fn note(id: &str, priority: u32) -> SyncQueueItem {
        SyncQueueItem::new(
            SyncPayload::UserContent(UserContent {
                content_id: id.into(),
                content_type: "note".into(),
                body: "hola".into(),
                updated_at: 0,
            }),
            priority,
            0,
        )
        .unwrap()
    }

    async fn put<T: Serialize>(storage: &InMemoryStorage, key: &str, value: &T) {
        storage.write(key, &serde_json::to_vec(value).unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_data_is_reported_per_domain() {
        let f = fixture();
        let results = f.engine.perform_full_sync().await.unwrap();

        assert_eq!(results.len(), 2);
        for result in &results {
            assert!(!result.success);
            assert_eq!(result.errors, vec!["no data".to_string()]);
        }
        assert_eq!(f.engine.status().state, SyncState::Idle);
        assert!(f.engine.status().last_sync.is_some());
    }

    #[tokio::test]
    async fn test_single_side_is_adopted_then_stable() {
        let f = fixture();
        let mut profile = UserProfile::new("u1");
        profile.unlock(Achievement {
            id: "first_word".into(),
            title: "First word".into(),
            unlocked_at: 1,
        });
        put(&f.storage, keys::PROFILE_LOCAL, &profile).await;

        let first = f.engine.perform_full_sync().await.unwrap();
        assert!(first[0].data_merged);
        assert!(f.storage.contains_key(keys::PROFILE_REMOTE));

        let second = f.engine.perform_full_sync().await.unwrap();
        assert!(!second[0].data_merged);
        assert_eq!(second[0].conflicts_resolved, 0);
    }

    #[tokio::test]
    async fn test_progress_conflicts_counted_and_resolved() {
        let f = fixture();
        let mut local = LearningProgress::new("u1");
        let mut word = VocabularyProgress::new("gato");
        word.interval_days = 4;
        local.upsert_word(word);
        let mut remote = LearningProgress::new("u1");
        let mut word = VocabularyProgress::new("gato");
        word.repetitions = 3;
        remote.upsert_word(word);
        put(&f.storage, keys::PROGRESS_LOCAL, &local).await;
        put(&f.storage, keys::PROGRESS_REMOTE, &remote).await;

        let results = f.engine.perform_full_sync().await.unwrap();
        let progress = &results[1];
        assert_eq!(progress.domain, DataDomain::Progress);
        assert_eq!(progress.conflicts_resolved, 1);
        assert!(progress.data_merged);
        assert_eq!(f.engine.status().pending_conflicts, 1);

        let merged: LearningProgress = serde_json::from_slice(
            &f.storage.read(keys::PROGRESS_REMOTE).await.unwrap().unwrap(),
        )
        .unwrap();
        assert_eq!(merged.vocabulary["gato"].interval_days, 4);
        assert_eq!(merged.vocabulary["gato"].repetitions, 3);

        let again = f.engine.perform_full_sync().await.unwrap();
        assert_eq!(again[1].conflicts_resolved, 0);
        assert!(!again[1].data_merged);
        assert_eq!(f.engine.status().pending_conflicts, 0);
    }

    #[tokio::test]
    async fn test_failed_item_marked_after_max_attempts() {
        let f = fixture();
        f.transport.fail("/api/sync/user_content");
        f.queue.enqueue(note("a", 1));

        let first = f.engine.drain_queue().await.unwrap();
        assert_eq!(first.sent, 0);
        assert!(first.failed.is_empty());
        assert_eq!(f.queue.items()[0].attempts, 1);

        let second = f.engine.drain_queue().await.unwrap();
        assert_eq!(second.failed.len(), 1);
        assert!(second.errors[0].contains("after 2 attempts"));
        assert!(f.queue.pending().is_empty());

        // Failed items are not retried automatically
        let third = f.engine.drain_queue().await.unwrap();
        assert_eq!(third, DrainReport::default());
        assert_eq!(f.transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_drain_success_removes_and_persists() {
        let f = fixture();
        f.queue.enqueue(note("a", 1));
        f.queue.enqueue(note("b", 2));

        let report = f.engine.drain_queue().await.unwrap();
        assert_eq!(report.sent, 2);
        assert!(f.queue.is_empty());

        let persisted: Vec<SyncQueueItem> =
            serde_json::from_slice(&f.storage.read(keys::SYNC_QUEUE).await.unwrap().unwrap())
                .unwrap();
        assert!(persisted.is_empty());
    }

    #[tokio::test]
    async fn test_offline_skips_network_stages() {
        let f = fixture();
        f.queue.enqueue(note("a", 1));
        f.engine.set_network_state(NetworkState::Offline);

        f.engine.perform_full_sync().await.unwrap();
        assert!(f.transport.calls().is_empty());
        assert_eq!(f.queue.len(), 1);
    }

    #[tokio::test]
    async fn test_offline_activity_cleared_only_on_full_success() {
        let f = fixture();
        f.engine
            .record_offline_activity(OfflineSession::new("v1".into(), SessionType::Vocabulary, 0))
            .await
            .unwrap();
        f.engine
            .record_offline_activity(OfflineSession::new("c1".into(), SessionType::Cultural, 0))
            .await
            .unwrap();
        f.transport.fail("/api/sync/progress");

        let results = f.engine.perform_full_sync().await.unwrap();
        assert!(results[1].errors.iter().any(|e| e.contains("progress")));
        assert_eq!(f.engine.offline_activity().len(), 2);

        f.transport.fail_endpoints.lock().clear();
        f.engine.perform_full_sync().await.unwrap();
        assert!(f.engine.offline_activity().is_empty());
        assert!(f
            .transport
            .calls()
            .contains(&"/api/sync/vocabulary-sessions".to_string()));
    }

    #[tokio::test]
    async fn test_init_restores_queue() {
        let f = fixture();
        f.queue.enqueue(note("a", 1));
        assert!(f.engine.persist_queue().await);

        let queue = Arc::new(SyncQueue::new(10));
        let engine = SyncEngine::new(
            fast_config(),
            f.storage.clone(),
            f.transport.clone(),
            Arc::new(ManualClock::new(0)),
            queue.clone(),
        );
        assert_eq!(engine.init().await, 1);
        assert_eq!(engine.get_sync_queue().len(), 1);
    }

    struct GatedTransport {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SyncTransport for GatedTransport {
        async fn send(&self, _: &OutboundRequest) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(TransportResponse::ok())
        }
    }

    #[tokio::test]
    async fn test_single_flight_and_cancellation() {
        let transport = Arc::new(GatedTransport {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let queue = Arc::new(SyncQueue::new(10));
        queue.enqueue(note("a", 2));
        queue.enqueue(note("b", 1));
        let engine = Arc::new(SyncEngine::new(
            fast_config(),
            Arc::new(InMemoryStorage::new()),
            transport.clone(),
            Arc::new(ManualClock::new(0)),
            queue.clone(),
        ));

        let running = engine.clone();
        let handle = tokio::spawn(async move { running.perform_full_sync().await });
        transport.entered.notified().await;

        assert!(matches!(
            engine.perform_full_sync().await,
            Err(SyncError::AlreadySyncing)
        ));
        assert_eq!(engine.status().state, SyncState::Syncing);

        engine.cancel();
        transport.release.notify_one();
        let outcome = handle.await.unwrap();

        assert!(matches!(outcome, Err(SyncError::Cancelled)));
        assert_eq!(engine.status().state, SyncState::Idle);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);
        assert!(engine.status().last_sync.is_none());
    }

    #[tokio::test]
    async fn test_reconnect_triggers_drain() {
        let f = fixture();
        f.queue.enqueue(note("a", 1));
        let (tx, rx) = watch::channel(NetworkState::Offline);
        let handle = f.engine.watch_network(rx);
        while f.engine.network_state() == NetworkState::Online {
            tokio::task::yield_now().await;
        }

        tx.send(NetworkState::Online).unwrap();
        for _ in 0..100 {
            if f.queue.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(f.queue.is_empty());
        assert_eq!(f.engine.network_state(), NetworkState::Online);

        drop(tx);
        handle.await.unwrap();
    }
}
