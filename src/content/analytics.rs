//! Aggregation of finished sessions into offline learning analytics.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::DAY_MS;

use super::session::{ActivityPerformance, OfflineSession, SessionType};
use super::types::{CachedContent, ContentItem};

const HOUR_MS: i64 = 60 * 60 * 1000;
const TOP_N: usize = 5;
const WEAK_MASTERY: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsagePatterns {
    pub total_offline_seconds: u64,
    pub sessions_per_day: f64,
    /// Session types, most frequent first
    pub preferred_activity_types: Vec<SessionType>,
    /// UTC hours of day, busiest first
    pub peak_hours: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Per-session accuracy in chronological order
    pub accuracy_trend: Vec<f64>,
    pub completion_rate: f64,
    /// Last session accuracy minus first session accuracy
    pub improvement_velocity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentEngagement {
    pub most_accessed: Vec<String>,
    /// Collections ordered by total accesses
    pub inferred_preferences: Vec<String>,
    /// Words with mastery below 0.5
    pub weak_areas: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfflineAnalytics {
    pub generated_at: i64,
    pub window_days: f64,
    pub session_count: usize,
    pub usage: UsagePatterns,
    pub performance: PerformanceMetrics,
    pub engagement: ContentEngagement,
}

/// Build analytics from sessions that started inside `window` and the
/// current cache contents.
#[must_use]
pub fn collect<'a>(
    sessions: &[OfflineSession],
    content: impl IntoIterator<Item = &'a CachedContent>,
    now: i64,
    window: Duration,
) -> OfflineAnalytics {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    let mut in_window: Vec<&OfflineSession> = sessions
        .iter()
        .filter(|s| now.saturating_sub(s.start_time) <= window_ms)
        .collect();
    in_window.sort_by_key(|s| s.start_time);

    let window_days = window_ms as f64 / DAY_MS as f64;

    OfflineAnalytics {
        generated_at: now,
        window_days,
        session_count: in_window.len(),
        usage: usage_patterns(&in_window, window_days),
        performance: performance_metrics(&in_window),
        engagement: content_engagement(&in_window, content),
    }
}

fn usage_patterns(sessions: &[&OfflineSession], window_days: f64) -> UsagePatterns {
    let mut type_counts: BTreeMap<SessionType, usize> = BTreeMap::new();
    let mut hour_counts: BTreeMap<u8, usize> = BTreeMap::new();
    let mut total_seconds = 0;

    for session in sessions {
        total_seconds += session.duration_seconds.unwrap_or(0);
        *type_counts.entry(session.session_type).or_default() += 1;
        let hour = (session.start_time.rem_euclid(DAY_MS) / HOUR_MS) as u8;
        *hour_counts.entry(hour).or_default() += 1;
    }

    UsagePatterns {
        total_offline_seconds: total_seconds,
        sessions_per_day: if window_days > 0.0 {
            sessions.len() as f64 / window_days.max(1.0)
        } else {
            0.0
        },
        preferred_activity_types: ranked(type_counts, usize::MAX),
        peak_hours: ranked(hour_counts, 3),
    }
}

fn performance_metrics(sessions: &[&OfflineSession]) -> PerformanceMetrics {
    let accuracy_trend: Vec<f64> = sessions
        .iter()
        .filter(|s| s.stats.graded_activities > 0)
        .map(|s| s.stats.accuracy)
        .collect();

    let (completed, total) = sessions.iter().fold((0u32, 0u32), |(c, t), s| {
        (
            c.saturating_add(s.stats.completed_activities),
            t.saturating_add(s.stats.total_activities),
        )
    });

    let improvement_velocity = match (accuracy_trend.first(), accuracy_trend.last()) {
        (Some(first), Some(last)) => last - first,
        _ => 0.0,
    };

    PerformanceMetrics {
        accuracy_trend,
        completion_rate: if total == 0 {
            0.0
        } else {
            f64::from(completed) / f64::from(total)
        },
        improvement_velocity,
    }
}

fn content_engagement<'a>(
    sessions: &[&OfflineSession],
    content: impl IntoIterator<Item = &'a CachedContent>,
) -> ContentEngagement {
    let mut access: BTreeMap<String, u32> = BTreeMap::new();
    let mut kind_access: BTreeMap<&'static str, u32> = BTreeMap::new();
    let mut weak: BTreeSet<String> = BTreeSet::new();

    for cached in content {
        if cached.access_count > 0 {
            access.insert(cached.item.id().to_string(), cached.access_count);
            *kind_access.entry(cached.item.kind().as_str()).or_default() += cached.access_count;
        }
        if let ContentItem::Vocabulary(v) = &cached.item {
            if v.mastery_level < WEAK_MASTERY {
                weak.insert(v.word.clone());
            }
        }
    }

    // Latest observed mastery per word wins over the cached value
    let mut latest: BTreeMap<&str, (i64, f64)> = BTreeMap::new();
    for session in sessions {
        for activity in &session.activities {
            if let ActivityPerformance::Vocabulary {
                word, mastery_level, ..
            } = &activity.performance
            {
                let slot = latest.entry(word.as_str()).or_insert((activity.timestamp, *mastery_level));
                if activity.timestamp >= slot.0 {
                    *slot = (activity.timestamp, *mastery_level);
                }
            }
        }
    }
    for (word, (_, mastery)) in latest {
        if mastery < WEAK_MASTERY {
            weak.insert(word.to_string());
        } else {
            weak.remove(word);
        }
    }

    ContentEngagement {
        most_accessed: ranked(access.into_iter().map(|(k, v)| (k, v as usize)).collect(), TOP_N),
        inferred_preferences: ranked(
            kind_access
                .into_iter()
                .map(|(k, v)| (k.to_string(), v as usize))
                .collect(),
            usize::MAX,
        ),
        weak_areas: weak.into_iter().collect(),
    }
}

/// Keys ordered by count desc, then key asc, truncated to `limit`.
fn ranked<K: Ord + Clone>(counts: BTreeMap<K, usize>, limit: usize) -> Vec<K> {
    let mut pairs: Vec<(K, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.into_iter().take(limit).map(|(k, _)| k).collect()
}
