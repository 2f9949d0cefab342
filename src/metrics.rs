// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for offline-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for installing a recorder.
//!
//! # Metric Naming Convention
//! - `offline_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `cache`: name of the cache store
//! - `kind`: content collection
//! - `domain`: profile, progress
//! - `status`: success, error, rejected

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// CACHE STORE
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cache lookup
pub fn record_cache_lookup(cache: &str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    counter!(
        "offline_sync_cache_lookups_total",
        "cache" => cache.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record eviction event
pub fn record_eviction(cache: &str, strategy: &str, bytes: usize) {
    counter!(
        "offline_sync_evictions_total",
        "cache" => cache.to_string(),
        "strategy" => strategy.to_string()
    )
    .increment(1);
    counter!("offline_sync_evicted_bytes_total").increment(bytes as u64);
}

/// Record entries removed by TTL expiry
pub fn record_expired(cache: &str, count: usize) {
    counter!(
        "offline_sync_expired_total",
        "cache" => cache.to_string()
    )
    .increment(count as u64);
}

/// Set current cache size
pub fn set_cache_usage(cache: &str, items: usize, bytes: usize) {
    gauge!("offline_sync_cache_items", "cache" => cache.to_string()).set(items as f64);
    gauge!("offline_sync_cache_bytes", "cache" => cache.to_string()).set(bytes as f64);
}

/// Record a value that could not be serialized for sizing
pub fn record_serialization_failure(cache: &str) {
    counter!(
        "offline_sync_serialization_failures_total",
        "cache" => cache.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTENT CACHE
// ═══════════════════════════════════════════════════════════════════════════

/// Record items merged into a content collection
pub fn record_content_cached(kind: &str, merged: usize, trimmed: usize) {
    counter!("offline_sync_content_cached_total", "kind" => kind.to_string())
        .increment(merged as u64);
    counter!("offline_sync_content_trimmed_total", "kind" => kind.to_string())
        .increment(trimmed as u64);
}

/// Record a read of a content collection
pub fn record_content_read(kind: &str, items: usize) {
    counter!("offline_sync_content_reads_total", "kind" => kind.to_string()).increment(1);
    histogram!("offline_sync_content_read_items", "kind" => kind.to_string()).record(items as f64);
}

/// Record an offline session lifecycle event
pub fn record_session(session_type: &str, event: &str) {
    counter!(
        "offline_sync_sessions_total",
        "type" => session_type.to_string(),
        "event" => event.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// SYNC QUEUE & ENGINE
// ═══════════════════════════════════════════════════════════════════════════

/// Set queue depth
pub fn set_queue_depth(count: usize) {
    gauge!("offline_sync_queue_items").set(count as f64);
}

/// Record an item dropped by queue truncation
pub fn record_queue_drop(data_type: &str) {
    counter!(
        "offline_sync_queue_dropped_total",
        "data_type" => data_type.to_string()
    )
    .increment(1);
}

/// Record a full sync run
pub fn record_sync_run(status: &str, duration: Duration) {
    counter!("offline_sync_runs_total", "status" => status.to_string()).increment(1);
    histogram!("offline_sync_run_seconds").record(duration.as_secs_f64());
}

/// Record conflicts detected while merging a domain
pub fn record_conflicts(domain: &str, count: u32) {
    counter!("offline_sync_conflicts_total", "domain" => domain.to_string())
        .increment(u64::from(count));
}

/// Record a transport request outcome
pub fn record_transport(endpoint: &str, status: &str) {
    counter!(
        "offline_sync_transport_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a persistence failure that was absorbed
pub fn record_storage_error(operation: &str) {
    counter!(
        "offline_sync_storage_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(component: &str, operation: &str, duration: Duration) {
    histogram!(
        "offline_sync_operation_seconds",
        "component" => component.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    component: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.component, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These verify the API doesn't panic without an installed recorder.

    #[test]
    fn test_cache_metrics() {
        record_cache_lookup("content", true);
        record_cache_lookup("content", false);
        record_eviction("content", "smart", 512);
        record_expired("content", 3);
        set_cache_usage("content", 10, 4096);
        record_serialization_failure("content");
    }

    #[test]
    fn test_sync_metrics() {
        set_queue_depth(4);
        record_queue_drop("session");
        record_sync_run("success", Duration::from_millis(12));
        record_conflicts("profile", 2);
        record_transport("/api/sync/sessions", "error");
        record_storage_error("write");
        record_content_cached("passages", 5, 1);
        record_content_read("passages", 5);
        record_session("vocabulary", "start");
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("cache", "get");
        }
    }
}
