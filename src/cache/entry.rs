//! Cache entry and priority tiers.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Retention tier of a cached value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Tier rank, 0 (low) to 3 (critical).
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
            Self::Critical => 3,
        }
    }

    /// Normalized tier weight in `[0, 1]`.
    #[must_use]
    pub fn weight(self) -> f64 {
        f64::from(self.rank()) / 3.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A cached value with its bookkeeping.
///
/// Timestamps are epoch millis from the store's clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub created_at: i64,
    pub ttl_ms: u64,
    pub priority: Priority,
    pub access_count: u64,
    pub last_accessed_at: i64,
    pub size_bytes: usize,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl<T> CacheEntry<T> {
    #[must_use]
    pub fn age_ms(&self, now: i64) -> i64 {
        (now - self.created_at).max(0)
    }

    #[must_use]
    pub fn idle_ms(&self, now: i64) -> i64 {
        (now - self.last_accessed_at).max(0)
    }

    /// Stale once age strictly exceeds the TTL.
    #[must_use]
    pub fn is_expired(&self, now: i64) -> bool {
        self.age_ms(now).unsigned_abs() > self.ttl_ms
    }

    pub fn record_access(&mut self, now: i64) {
        self.last_accessed_at = now;
        self.access_count = self.access_count.saturating_add(1);
    }
}
