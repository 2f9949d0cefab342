//! Integration tests for the offline cache and sync engine.
//!
//! Everything runs in-process: storage is either in-memory or a SQLite file
//! in a temp directory, and the remote side is a recording transport.
//!
//! # Running Tests
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//! - `content_*` - Content caching, trimming and sessions
//! - `sync_*` - Merging, queue draining and persistence across restarts
//! - `cache_*` - Generic cache store behavior over real storage

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use offline_sync::cache::{CacheStore, EvictionStrategy, Priority, SetOptions};
use offline_sync::clock::{ManualClock, DAY_MS};
use offline_sync::codec::IdentityCodec;
use offline_sync::config::{CacheConfig, ContentCacheConfig, SyncConfig};
use offline_sync::content::{
    Activity, ActivityPerformance, ContentCacheManager, ContentItem, ContentKind, Passage,
    SessionType,
};
use offline_sync::model::{Achievement, UserProfile};
use offline_sync::storage::{InMemoryStorage, KvStorage, SharedStorage, SqliteStorage};
use offline_sync::sync::{
    keys, DataType, OutboundRequest, SyncPayload, SyncQueue, SyncTransport, TransportError,
    TransportResponse,
};
use offline_sync::SyncEngine;

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct RecordingTransport {
    requests: Mutex<Vec<OutboundRequest>>,
}

#[async_trait]
impl SyncTransport for RecordingTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(request.clone());
        Ok(TransportResponse::ok())
    }
}

fn sync_config() -> SyncConfig {
    SyncConfig {
        max_attempts: 2,
        retry_initial_delay_ms: 1,
        retry_max_delay_ms: 2,
        retry_max_retries: 1,
        ..Default::default()
    }
}

fn passage(id: &str, priority: Priority) -> ContentItem {
    ContentItem::Passage(Passage {
        id: id.into(),
        title: format!("Passage {}", id),
        text: "El gato duerme en la ventana.".into(),
        language: "es".into(),
        priority,
        word_count: 6,
        ..Default::default()
    })
}

fn vocab_activity(word: &str, correct: bool, at: i64) -> Activity {
    Activity {
        activity_type: "vocabulary".into(),
        content_id: word.into(),
        performance: ActivityPerformance::Vocabulary {
            word: word.into(),
            correct,
            response_time_ms: 1200,
            mastery_level: 0.4,
        },
        completed: true,
        timestamp: at,
    }
}

fn achievement(id: &str, at: i64) -> Achievement {
    Achievement {
        id: id.into(),
        title: id.to_uppercase(),
        unlocked_at: at,
    }
}

async fn open_sqlite(dir: &TempDir) -> Arc<SqliteStorage> {
    Arc::new(
        SqliteStorage::open(dir.path().join("offline.db"))
            .await
            .expect("open sqlite"),
    )
}

// =============================================================================
// Content
// =============================================================================

#[tokio::test]
async fn content_critical_passage_survives_trim() {
    let clock = Arc::new(ManualClock::new(10 * DAY_MS));
    let queue = Arc::new(SyncQueue::new(100));
    let manager = ContentCacheManager::new(
        ContentCacheConfig {
            max_items_per_collection: 1,
            ..Default::default()
        },
        Arc::new(InMemoryStorage::new()),
        clock.clone(),
        queue,
    );

    manager
        .cache_content(ContentKind::Passages, vec![passage("low", Priority::Low)])
        .unwrap();
    clock.advance(Duration::from_secs(60));
    let report = manager
        .cache_content(ContentKind::Passages, vec![passage("crit", Priority::Critical)])
        .unwrap();

    assert_eq!(report.trimmed, 1);
    let ids: Vec<String> = manager
        .get_cached_passages()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec!["crit".to_string()]);
}

#[tokio::test]
async fn content_finished_session_is_queued_for_sync() {
    let queue = Arc::new(SyncQueue::new(100));
    let manager = ContentCacheManager::new(
        ContentCacheConfig::default(),
        Arc::new(InMemoryStorage::new()),
        Arc::new(ManualClock::new(1_000_000)),
        queue.clone(),
    );

    let id = manager.start_session(SessionType::Vocabulary);
    for (i, word) in ["uno", "dos", "tres", "cuatro", "cinco"].iter().enumerate() {
        assert!(manager.update_session(&id, vocab_activity(word, i % 2 == 0, 1_000_000)));
    }
    let session = manager.end_session(&id).expect("open session");
    assert_eq!(session.stats.total_activities, 5);

    let items = queue.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].data_type, DataType::Session);
    assert_eq!(items[0].priority, 4);
    assert_eq!(items[0].attempts, 0);
    match &items[0].content {
        SyncPayload::Session(queued) => assert_eq!(queued.activities.len(), 5),
        other => panic!("unexpected payload {:?}", other.data_type()),
    }
}

#[tokio::test]
async fn content_survives_restart_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(DAY_MS));

    {
        let storage = open_sqlite(&dir).await;
        let manager = ContentCacheManager::new(
            ContentCacheConfig::default(),
            storage.clone(),
            clock.clone(),
            Arc::new(SyncQueue::new(10)),
        );
        manager
            .cache_content(
                ContentKind::Passages,
                vec![passage("a", Priority::High), passage("b", Priority::Low)],
            )
            .unwrap();
        let id = manager.start_session(SessionType::Reading);
        manager.end_session(&id);
        manager.flush().await.unwrap();
        storage.close().await;
    }

    let storage = open_sqlite(&dir).await;
    let manager = ContentCacheManager::new(
        ContentCacheConfig::default(),
        storage,
        clock,
        Arc::new(SyncQueue::new(10)),
    );
    assert_eq!(manager.init().await, 2);
    assert_eq!(manager.get_cached_passages().len(), 2);
    assert_eq!(manager.recent_sessions().len(), 1);
}

// =============================================================================
// Sync
// =============================================================================

#[tokio::test]
async fn sync_achievements_union_across_devices() {
    let dir = tempfile::tempdir().unwrap();
    let storage = open_sqlite(&dir).await;

    let mut local = UserProfile::new("learner");
    local.unlock(achievement("x", 1));
    local.unlock(achievement("y", 2));
    let mut remote = UserProfile::new("learner");
    remote.unlock(achievement("y", 2));
    remote.unlock(achievement("z", 3));
    storage
        .write(keys::PROFILE_LOCAL, &serde_json::to_vec(&local).unwrap())
        .await
        .unwrap();
    storage
        .write(keys::PROFILE_REMOTE, &serde_json::to_vec(&remote).unwrap())
        .await
        .unwrap();

    let engine = SyncEngine::new(
        sync_config(),
        storage.clone(),
        Arc::new(RecordingTransport::default()),
        Arc::new(ManualClock::new(10)),
        Arc::new(SyncQueue::new(10)),
    );
    let results = engine.perform_full_sync().await.unwrap();
    assert!(results[0].success);
    assert!(results[0].data_merged);

    for key in [keys::PROFILE_LOCAL, keys::PROFILE_REMOTE] {
        let merged: UserProfile =
            serde_json::from_slice(&storage.read(key).await.unwrap().unwrap()).unwrap();
        assert_eq!(merged.achievement_ids(), vec!["x", "y", "z"]);
    }

    let again = engine.perform_full_sync().await.unwrap();
    assert!(!again[0].data_merged);
    assert_eq!(again[0].conflicts_resolved, 0);
}

#[tokio::test]
async fn sync_queue_drains_in_priority_order() {
    let storage: SharedStorage = Arc::new(InMemoryStorage::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let queue = Arc::new(SyncQueue::new(100));
    let transport = Arc::new(RecordingTransport::default());
    let manager = ContentCacheManager::new(
        ContentCacheConfig::default(),
        storage.clone(),
        clock.clone(),
        queue.clone(),
    );
    let engine = SyncEngine::new(
        sync_config(),
        storage,
        transport.clone(),
        clock.clone(),
        queue.clone(),
    );

    for session_type in [SessionType::Cultural, SessionType::Vocabulary, SessionType::Reading] {
        let id = manager.start_session(session_type);
        clock.advance(Duration::from_secs(1));
        manager.end_session(&id);
    }
    assert_eq!(queue.len(), 3);

    let report = engine.drain_queue().await.unwrap();
    assert_eq!(report.sent, 3);
    assert!(queue.is_empty());

    let order: Vec<SessionType> = transport
        .requests
        .lock()
        .iter()
        .map(|r| {
            let payload: SyncPayload = serde_json::from_slice(&r.body).unwrap();
            match payload {
                SyncPayload::Session(s) => s.session_type,
                other => panic!("unexpected payload {:?}", other.data_type()),
            }
        })
        .collect();
    assert_eq!(
        order,
        vec![SessionType::Vocabulary, SessionType::Reading, SessionType::Cultural]
    );
}

#[tokio::test]
async fn sync_queue_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(5_000));

    {
        let storage = open_sqlite(&dir).await;
        let queue = Arc::new(SyncQueue::new(10));
        let manager = ContentCacheManager::new(
            ContentCacheConfig::default(),
            storage.clone(),
            clock.clone(),
            queue.clone(),
        );
        let engine = SyncEngine::new(
            sync_config(),
            storage.clone(),
            Arc::new(RecordingTransport::default()),
            clock.clone(),
            queue,
        );
        let id = manager.start_session(SessionType::Quiz);
        manager.end_session(&id);
        assert!(engine.persist_queue().await);
        storage.close().await;
    }

    let storage = open_sqlite(&dir).await;
    let engine = SyncEngine::new(
        sync_config(),
        storage,
        Arc::new(RecordingTransport::default()),
        clock,
        Arc::new(SyncQueue::new(10)),
    );
    assert_eq!(engine.init().await, 1);
    assert_eq!(engine.get_sync_queue()[0].priority, 2);
}

#[tokio::test]
async fn sync_content_flush_persists_queue_for_engine() {
    let storage: SharedStorage = Arc::new(InMemoryStorage::new());
    let clock = Arc::new(ManualClock::new(5_000));
    let manager = ContentCacheManager::new(
        ContentCacheConfig::default(),
        storage.clone(),
        clock.clone(),
        Arc::new(SyncQueue::new(10)),
    );
    let id = manager.start_session(SessionType::Vocabulary);
    manager.end_session(&id);
    manager.flush().await.unwrap();

    let engine = SyncEngine::new(
        sync_config(),
        storage,
        Arc::new(RecordingTransport::default()),
        clock,
        Arc::new(SyncQueue::new(10)),
    );
    assert_eq!(engine.init().await, 1);
    assert_eq!(engine.get_sync_queue()[0].data_type, DataType::Session);
}

// =============================================================================
// Generic cache
// =============================================================================

#[tokio::test]
async fn cache_snapshot_round_trips_through_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let config = CacheConfig {
        max_items: 2,
        strategy: EvictionStrategy::Lru,
        ..Default::default()
    };

    {
        let storage = open_sqlite(&dir).await;
        let store: CacheStore<String> = CacheStore::new("words", config.clone(), clock.clone())
            .with_persistence(storage.clone(), Arc::new(IdentityCodec));
        store.set("hola", "hello".into(), SetOptions::default());
        clock.advance(Duration::from_millis(10));
        store.set("adios", "bye".into(), SetOptions::default());
        clock.advance(Duration::from_millis(10));
        store.get("hola");
        clock.advance(Duration::from_millis(10));
        // Evicts "adios", the least recently used
        store.set("gracias", "thanks".into(), SetOptions::default());
        assert!(store.persist().await);
        storage.close().await;
    }

    let storage = open_sqlite(&dir).await;
    let store: CacheStore<String> = CacheStore::new("words", config, clock)
        .with_persistence(storage, Arc::new(IdentityCodec));
    assert_eq!(store.restore().await, 2);
    assert!(store.has("hola"));
    assert!(store.has("gracias"));
    assert!(!store.has("adios"));
}
