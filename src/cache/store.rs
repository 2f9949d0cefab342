// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded, TTL-aware key/value store.
//!
//! All state lives behind one `parking_lot::Mutex`, so the background expiry
//! sweep can never interleave with a `set` that is resizing the store.
//! Locks are never held across an `.await`.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::codec::{CodecError, IdentityCodec, SharedCodec};
use crate::config::CacheConfig;
use crate::metrics;
use crate::storage::{SharedStorage, StorageError};

use super::entry::{CacheEntry, Priority};
use super::events::{CacheEvent, InvalidationCause};
use super::eviction::SmartPolicy;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("invalid invalidation pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("snapshot storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("snapshot codec failed: {0}")]
    Codec(#[from] CodecError),

    #[error("snapshot format invalid: {0}")]
    Format(#[from] serde_json::Error),
}

/// Per-call options for [`CacheStore::set`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Falls back to `CacheConfig::default_ttl_ms`
    pub ttl: Option<Duration>,
    pub priority: Priority,
    pub tags: Vec<String>,
}

impl SetOptions {
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0.0 before the first lookup
    pub hit_rate: f64,
    pub total_items: usize,
    pub total_size_bytes: usize,
    pub average_access_latency: Duration,
    pub eviction_count: u64,
}

struct Inner<T> {
    entries: HashMap<String, CacheEntry<T>>,
    total_size: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
    access_latency_total: Duration,
    access_samples: u64,
}

impl<T> Inner<T> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            total_size: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            access_latency_total: Duration::ZERO,
            access_samples: 0,
        }
    }

    fn take(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.total_size = self.total_size.saturating_sub(entry.size_bytes);
        Some(entry)
    }
}

/// Generic bounded cache.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use offline_sync::cache::{CacheStore, SetOptions, Priority};
/// use offline_sync::clock::SystemClock;
/// use offline_sync::config::CacheConfig;
///
/// let store: CacheStore<String> = CacheStore::new("words", CacheConfig::default(), Arc::new(SystemClock));
/// assert!(store.set("hola", "hello".to_string(), SetOptions::default().priority(Priority::High)));
/// assert_eq!(store.get("hola").as_deref(), Some("hello"));
/// assert_eq!(store.stats().hits, 1);
/// ```
pub struct CacheStore<T> {
    name: String,
    config: CacheConfig,
    clock: SharedClock,
    policy: SmartPolicy,
    inner: Mutex<Inner<T>>,
    events: broadcast::Sender<CacheEvent>,
    storage: Option<SharedStorage>,
    codec: SharedCodec,
    disposed: AtomicBool,
}

impl<T> CacheStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, config: CacheConfig, clock: SharedClock) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            name: name.into(),
            config,
            clock,
            policy: SmartPolicy::default(),
            inner: Mutex::new(Inner::new()),
            events,
            storage: None,
            codec: Arc::new(IdentityCodec),
            disposed: AtomicBool::new(false),
        }
    }

    /// Attach a storage adapter and codec for `persist`/`restore`.
    #[must_use]
    pub fn with_persistence(mut self, storage: SharedStorage, codec: SharedCodec) -> Self {
        self.storage = Some(storage);
        self.codec = codec;
        self
    }

    /// Override the smart-eviction weights.
    #[must_use]
    pub fn with_policy(mut self, policy: SmartPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Subscribe to cache events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: CacheEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Insert or replace `key`.
    ///
    /// Returns `false` only when the value cannot be serialized for sizing.
    /// Capacity pressure is resolved by eviction, never by rejecting the call.
    pub fn set(&self, key: &str, value: T, options: SetOptions) -> bool {
        let size_bytes = match serde_json::to_vec(&value) {
            Ok(bytes) => bytes.len() + key.len(),
            Err(e) => {
                warn!(cache = %self.name, key, error = %e, "Failed to serialize cache value");
                metrics::record_serialization_failure(&self.name);
                return false;
            }
        };

        let now = self.clock.now_millis();
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            created_at: now,
            ttl_ms: options
                .ttl
                .map_or(self.config.default_ttl_ms, |ttl| {
                    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
                }),
            priority: options.priority,
            access_count: 0,
            last_accessed_at: now,
            size_bytes,
            tags: options.tags.into_iter().collect(),
        };
        let priority = entry.priority;

        let mut guard = self.inner.lock();
        let replaced = self.insert_locked(&mut guard, entry, now);
        self.emit(CacheEvent::Set {
            key: key.to_string(),
            size_bytes,
            priority,
            replaced,
        });
        self.enforce_budget_locked(&mut guard);
        metrics::set_cache_usage(&self.name, guard.entries.len(), guard.total_size);
        true
    }

    /// Insert after making room. Returns whether an existing entry was replaced.
    fn insert_locked(&self, inner: &mut Inner<T>, entry: CacheEntry<T>, now: i64) -> bool {
        let replaced = inner.take(&entry.key).is_some();
        self.purge_expired_locked(inner, now);
        self.make_space(inner, entry.size_bytes, now);
        inner.total_size += entry.size_bytes;
        inner.entries.insert(entry.key.clone(), entry);
        replaced
    }

    /// Evict until one more entry of `incoming` bytes fits.
    fn make_space(&self, inner: &mut Inner<T>, incoming: usize, now: i64) {
        while !inner.entries.is_empty()
            && (inner.entries.len() + 1 > self.config.max_items
                || inner.total_size + incoming > self.config.max_size_bytes)
        {
            let Some(victim) =
                self.policy
                    .select_victim(self.config.strategy, inner.entries.values(), now)
            else {
                break;
            };
            self.evict_locked(inner, &victim);
        }
    }

    /// An entry larger than the whole budget (or `max_items == 0`) cannot
    /// stay; it is evicted like any other entry once everything else is gone.
    fn enforce_budget_locked(&self, inner: &mut Inner<T>) {
        let now = self.clock.now_millis();
        while inner.total_size > self.config.max_size_bytes
            || inner.entries.len() > self.config.max_items
        {
            let Some(victim) =
                self.policy
                    .select_victim(self.config.strategy, inner.entries.values(), now)
            else {
                break;
            };
            warn!(cache = %self.name, key = %victim, "Entry exceeds cache budget, evicting");
            self.evict_locked(inner, &victim);
        }
    }

    fn evict_locked(&self, inner: &mut Inner<T>, key: &str) {
        if let Some(entry) = inner.take(key) {
            inner.evictions += 1;
            debug!(
                cache = %self.name,
                key,
                strategy = %self.config.strategy,
                size_bytes = entry.size_bytes,
                "Evicted cache entry"
            );
            metrics::record_eviction(&self.name, &self.config.strategy.to_string(), entry.size_bytes);
            self.emit(CacheEvent::Evict {
                key: entry.key,
                strategy: self.config.strategy,
                size_bytes: entry.size_bytes,
            });
        }
    }

    fn purge_expired_locked(&self, inner: &mut Inner<T>, now: i64) -> Vec<String> {
        let expired: Vec<String> = inner
            .entries
            .values()
            .filter(|e| e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            inner.take(key);
        }
        if !expired.is_empty() {
            metrics::record_expired(&self.name, expired.len());
            self.emit(CacheEvent::Cleanup {
                keys: expired.clone(),
            });
        }
        expired
    }

    /// Look up `key`. Unknown and expired keys are misses; expired entries are removed.
    pub fn get(&self, key: &str) -> Option<T> {
        let started = Instant::now();
        let now = self.clock.now_millis();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        let value = match inner.entries.get(key).map(|e| e.is_expired(now)) {
            None => None,
            Some(true) => {
                inner.take(key);
                self.emit(CacheEvent::Cleanup {
                    keys: vec![key.to_string()],
                });
                None
            }
            Some(false) => inner.entries.get_mut(key).map(|entry| {
                entry.record_access(now);
                entry.value.clone()
            }),
        };

        let hit = value.is_some();
        if hit {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        inner.access_latency_total += started.elapsed();
        inner.access_samples += 1;

        metrics::record_cache_lookup(&self.name, hit);
        self.emit(CacheEvent::Get {
            key: key.to_string(),
            hit,
        });
        value
    }

    /// Entry metadata without counting an access.
    pub fn peek_entry(&self, key: &str) -> Option<CacheEntry<T>> {
        let now = self.clock.now_millis();
        self.inner
            .lock()
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .cloned()
    }

    /// TTL-aware existence check. Does not touch hit/miss counters.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let mut guard = self.inner.lock();
        match guard.entries.get(key).map(|e| e.is_expired(now)) {
            Some(false) => true,
            Some(true) => {
                guard.take(key);
                self.emit(CacheEvent::Cleanup {
                    keys: vec![key.to_string()],
                });
                false
            }
            None => false,
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        let removed = self.inner.lock().take(key).is_some();
        if removed {
            self.emit(CacheEvent::Delete {
                key: key.to_string(),
            });
        }
        removed
    }

    pub fn clear(&self) {
        let removed = {
            let mut guard = self.inner.lock();
            let removed = guard.entries.len();
            guard.entries.clear();
            guard.total_size = 0;
            removed
        };
        info!(cache = %self.name, removed, "Cache cleared");
        self.emit(CacheEvent::Clear { removed });
    }

    /// Remove every entry carrying `tag`.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let keys = self.invalidate_where(|entry| entry.tags.contains(tag));
        let count = keys.len();
        self.emit(CacheEvent::Invalidate {
            cause: InvalidationCause::Tag(tag.to_string()),
            keys,
        });
        count
    }

    /// Remove every entry whose key matches the regular expression `pattern`.
    pub fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let re = Regex::new(pattern).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let keys = self.invalidate_where(|entry| re.is_match(&entry.key));
        let count = keys.len();
        self.emit(CacheEvent::Invalidate {
            cause: InvalidationCause::Pattern(pattern.to_string()),
            keys,
        });
        Ok(count)
    }

    fn invalidate_where(&self, predicate: impl Fn(&CacheEntry<T>) -> bool) -> Vec<String> {
        let mut guard = self.inner.lock();
        let mut keys: Vec<String> = guard
            .entries
            .values()
            .filter(|e| predicate(e))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        for key in &keys {
            guard.take(key);
        }
        keys
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let removed = self.purge_expired_locked(&mut self.inner.lock(), now).len();
        if removed > 0 {
            debug!(cache = %self.name, removed, "Expired entries swept");
        }
        removed
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now_millis();
        let mut keys: Vec<String> = self
            .inner
            .lock()
            .entries
            .values()
            .filter(|e| !e.is_expired(now))
            .map(|e| e.key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Stored entry count (may include not-yet-swept expired entries).
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.inner.lock();
        let lookups = guard.hits + guard.misses;
        CacheStats {
            hits: guard.hits,
            misses: guard.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                guard.hits as f64 / lookups as f64
            },
            total_items: guard.entries.len(),
            total_size_bytes: guard.total_size,
            average_access_latency: if guard.access_samples == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(
                    (guard.access_latency_total.as_nanos() / u128::from(guard.access_samples)) as u64,
                )
            },
            eviction_count: guard.evictions,
        }
    }

    /// Start the periodic expiry sweep.
    ///
    /// The task holds only a weak reference and stops once the store is
    /// dropped or [`dispose`](Self::dispose) is called.
    pub fn spawn_cleanup(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.cleanup_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else { break };
                if store.is_disposed() {
                    break;
                }
                store.cleanup_expired();
            }
        })
    }

    /// Stop background work. The store stays readable.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Snapshot live entries to the storage adapter.
    ///
    /// Failures are logged; the in-memory cache is unaffected either way.
    pub async fn persist(&self) -> bool {
        let Some(storage) = self.storage.as_ref() else {
            return false;
        };
        let bytes = match self.encode_snapshot() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(cache = %self.name, error = %e, "Failed to encode cache snapshot");
                return false;
            }
        };

        match storage.write(&self.config.snapshot_key, &bytes).await {
            Ok(()) => {
                debug!(cache = %self.name, bytes = bytes.len(), codec = self.codec.name(), "Cache snapshot written");
                true
            }
            Err(e) => {
                warn!(cache = %self.name, error = %e, "Cache snapshot write failed, continuing in memory");
                metrics::record_storage_error("cache_persist");
                false
            }
        }
    }

    fn encode_snapshot(&self) -> Result<Vec<u8>, CacheError> {
        let now = self.clock.now_millis();
        let entries: Vec<CacheEntry<T>> = {
            let guard = self.inner.lock();
            guard
                .entries
                .values()
                .filter(|e| !e.is_expired(now))
                .cloned()
                .collect()
        };
        let json = serde_json::to_vec(&entries)?;
        Ok(self.codec.encode(&json)?)
    }

    fn decode_snapshot(&self, bytes: &[u8]) -> Result<Vec<CacheEntry<T>>, CacheError> {
        let json = self.codec.decode(bytes)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Load a snapshot written by [`persist`](Self::persist).
    ///
    /// Expired entries are skipped and capacity limits still apply.
    /// Returns the number of entries restored (0 on any failure).
    pub async fn restore(&self) -> usize {
        let Some(storage) = self.storage.as_ref() else {
            return 0;
        };
        let bytes = match storage.read(&self.config.snapshot_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return 0,
            Err(e) => {
                warn!(cache = %self.name, error = %e, "Cache snapshot read failed, starting empty");
                metrics::record_storage_error("cache_restore");
                return 0;
            }
        };
        let mut entries = match self.decode_snapshot(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(cache = %self.name, error = %e, "Cache snapshot unreadable, starting empty");
                return 0;
            }
        };

        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        let now = self.clock.now_millis();
        let mut guard = self.inner.lock();
        let mut restored = 0;
        for entry in entries.into_iter().filter(|e| !e.is_expired(now)) {
            self.insert_locked(&mut guard, entry, now);
            restored += 1;
        }
        self.enforce_budget_locked(&mut guard);
        info!(cache = %self.name, restored, "Cache snapshot restored");
        restored
    }

    /// Tags attached to `key`.
    pub fn tags(&self, key: &str) -> Option<BTreeSet<String>> {
        self.inner.lock().entries.get(key).map(|e| e.tags.clone())
    }
}
