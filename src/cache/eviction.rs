// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Eviction strategies for [`super::CacheStore`].
//!
//! Every strategy picks exactly one victim per call; the store loops until
//! it is back under budget. Ties always fall back to the oldest
//! `created_at`, then to key order, so victim selection is deterministic.

use std::cmp::Ordering;
use std::fmt;

use serde::Deserialize;

use super::entry::CacheEntry;

/// Victim selection strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionStrategy {
    /// Oldest `last_accessed_at` first
    Lru,
    /// Lowest `access_count` first
    Lfu,
    /// Oldest `created_at` first
    Fifo,
    /// Lowest priority tier first
    Priority,
    /// Lowest [`SmartPolicy`] score first
    #[default]
    Smart,
}

impl fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lru => write!(f, "lru"),
            Self::Lfu => write!(f, "lfu"),
            Self::Fifo => write!(f, "fifo"),
            Self::Priority => write!(f, "priority"),
            Self::Smart => write!(f, "smart"),
        }
    }
}

/// Weighted score combining priority tier, access frequency, recency and age.
///
/// `score = w.priority * tier + w.frequency * freq + w.recency * recency - w.age * age`
///
/// - `tier`: priority rank normalized to `[0, 1]`
/// - `freq`: `ln(1 + count) / ln(1 + max_access_count)`, capped at 1
/// - `recency`: `exp(-idle / half_life)`
/// - `age`: `age / max_age`, capped at 1
#[derive(Debug, Clone)]
pub struct SmartPolicy {
    /// Half-life for recency decay (seconds)
    pub recency_half_life: f64,
    /// Access count treated as "maximally hot"
    pub max_access_count: u64,
    /// Age at which the age penalty saturates (seconds)
    pub max_age_secs: f64,
    pub weights: SmartWeights,
}

#[derive(Debug, Clone, Copy)]
pub struct SmartWeights {
    pub priority: f64,
    pub frequency: f64,
    pub recency: f64,
    pub age: f64,
}

impl Default for SmartPolicy {
    fn default() -> Self {
        Self {
            recency_half_life: 3600.0, // 1 hour
            max_access_count: 1000,
            max_age_secs: 24.0 * 3600.0,
            weights: SmartWeights {
                priority: 0.4,
                frequency: 0.3,
                recency: 0.2,
                age: 0.1,
            },
        }
    }
}

impl SmartPolicy {
    /// Higher scores are kept longer.
    #[must_use]
    pub fn score<T>(&self, entry: &CacheEntry<T>, now: i64) -> f64 {
        let idle_secs = entry.idle_ms(now) as f64 / 1000.0;
        let age_secs = entry.age_ms(now) as f64 / 1000.0;

        let recency = (-idle_secs / self.recency_half_life).exp();
        let frequency = if entry.access_count == 0 {
            0.0
        } else {
            let count = entry.access_count.min(self.max_access_count) as f64;
            (1.0 + count).ln() / (1.0 + self.max_access_count as f64).ln()
        };
        let age = (age_secs / self.max_age_secs).min(1.0);

        entry.priority.weight() * self.weights.priority
            + frequency * self.weights.frequency
            + recency * self.weights.recency
            - age * self.weights.age
    }

    /// Pick the next victim under `strategy`.
    pub fn select_victim<'a, T: 'a>(
        &self,
        strategy: EvictionStrategy,
        entries: impl Iterator<Item = &'a CacheEntry<T>>,
        now: i64,
    ) -> Option<String> {
        entries
            .min_by(|a, b| self.compare(strategy, a, b, now))
            .map(|e| e.key.clone())
    }

    /// `Less` means `a` is evicted before `b`.
    fn compare<T>(
        &self,
        strategy: EvictionStrategy,
        a: &CacheEntry<T>,
        b: &CacheEntry<T>,
        now: i64,
    ) -> Ordering {
        let primary = match strategy {
            EvictionStrategy::Lru => a.last_accessed_at.cmp(&b.last_accessed_at),
            EvictionStrategy::Lfu => a.access_count.cmp(&b.access_count),
            EvictionStrategy::Fifo => Ordering::Equal,
            EvictionStrategy::Priority => a.priority.cmp(&b.priority),
            EvictionStrategy::Smart => self
                .score(a, now)
                .partial_cmp(&self.score(b, now))
                .unwrap_or(Ordering::Equal),
        };

        primary
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.key.cmp(&b.key))
    }
}
