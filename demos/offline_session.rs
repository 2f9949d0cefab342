// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Offline study session example.
//!
//! Demonstrates:
//! 1. Opening SQLite-backed storage
//! 2. Caching passages and vocabulary for offline use
//! 3. Recording a vocabulary session while offline
//! 4. Reconnecting and draining the sync queue
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=offline_sync=debug cargo run --example offline_session
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use offline_sync::cache::Priority;
use offline_sync::clock::SystemClock;
use offline_sync::content::{
    Activity, ActivityPerformance, ContentItem, ContentKind, Passage, VocabularyItem,
};
use offline_sync::sync::{
    NetworkState, OutboundRequest, SyncTransport, TransportError, TransportResponse,
};
use offline_sync::{
    ContentCacheManager, OfflineConfig, SessionType, SqliteStorage, SyncEngine, SyncQueue,
};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Prints every request instead of talking to a server.
struct LoopbackTransport;

#[async_trait]
impl SyncTransport for LoopbackTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
        println!(
            "   → {} ({} bytes, key {}…)",
            request.endpoint,
            request.body.len(),
            &request.idempotency_key[..12]
        );
        Ok(TransportResponse::ok())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let dir = tempfile::tempdir()?;
    let storage = Arc::new(SqliteStorage::open(dir.path().join("offline.db")).await?);
    let clock = Arc::new(SystemClock);
    let config = OfflineConfig::default();

    let queue = Arc::new(SyncQueue::new(config.sync.max_queue_size));
    let content = ContentCacheManager::new(
        config.content.clone(),
        storage.clone(),
        clock.clone(),
        queue.clone(),
    );
    let engine = Arc::new(SyncEngine::new(
        config.sync.clone(),
        storage.clone(),
        Arc::new(LoopbackTransport),
        clock,
        queue.clone(),
    ));
    content.init().await;
    engine.init().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Cache content while online
    // ─────────────────────────────────────────────────────────────────────────
    println!("📦 Caching content...");
    content.cache_content(
        ContentKind::Passages,
        vec![ContentItem::Passage(Passage {
            id: "mercado".into(),
            title: "En el mercado".into(),
            text: "Los sábados vamos al mercado a comprar fruta.".into(),
            language: "es".into(),
            priority: Priority::High,
            word_count: 9,
            ..Default::default()
        })],
    )?;
    let words = ["fruta", "mercado", "comprar"];
    content.cache_content(
        ContentKind::Vocabulary,
        words
            .iter()
            .map(|w| {
                ContentItem::Vocabulary(VocabularyItem {
                    id: (*w).into(),
                    word: (*w).into(),
                    translation: String::new(),
                    difficulty: Default::default(),
                    mastery_level: 0.2,
                    example: None,
                })
            })
            .collect(),
    )?;
    println!("   {:?}", content.cache_stats());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Study offline
    // ─────────────────────────────────────────────────────────────────────────
    let (network_tx, network_rx) = watch::channel(NetworkState::Offline);
    let watcher = engine.watch_network(network_rx);

    println!("\n✈️  Offline vocabulary session...");
    let session = content.start_session(SessionType::Vocabulary);
    for (i, word) in words.iter().enumerate() {
        content.update_session(
            &session,
            Activity {
                activity_type: "vocabulary".into(),
                content_id: (*word).into(),
                performance: ActivityPerformance::Vocabulary {
                    word: (*word).into(),
                    correct: i != 1,
                    response_time_ms: 1500,
                    mastery_level: 0.3,
                },
                completed: true,
                timestamp: 0,
            },
        );
    }
    if let Some(done) = content.end_session(&session) {
        println!("   accuracy {:.2}, queued {}", done.stats.accuracy, queue.len());
    }
    content.flush().await?;
    engine.persist_queue().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Reconnect
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📶 Back online...");
    network_tx.send(NetworkState::Online)?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    println!("   queue after drain: {}", queue.len());

    let results = engine.perform_full_sync().await?;
    for result in &results {
        println!(
            "   {}: success={} conflicts={} errors={:?}",
            result.domain, result.success, result.conflicts_resolved, result.errors
        );
    }

    drop(network_tx);
    watcher.await?;
    content.dispose();
    storage.close().await;
    Ok(())
}
