//! Retention scoring for cached content.
//!
//! `score = access_count * 10 + recency + difficulty + explicit priority`
//!
//! | Component         | Range                                             |
//! |-------------------|---------------------------------------------------|
//! | recency           | 30 at access time, linearly down to 0 at 30 days  |
//! | difficulty        | beginner 20, intermediate 10, advanced 0          |
//! | explicit priority | low 0, medium 25, high 50, critical 100           |
//!
//! Easier material and editor-flagged passages survive trimming longest.

use crate::cache::Priority;
use crate::clock::DAY_MS;

use super::types::{CachedContent, DifficultyLevel};

const ACCESS_WEIGHT: f64 = 10.0;
const RECENCY_CEILING: f64 = 30.0;
const RECENCY_WINDOW_DAYS: f64 = 30.0;

/// Linear decay from 30 to 0 across 30 days since the last access.
#[must_use]
pub fn recency_weight(last_accessed: i64, now: i64) -> f64 {
    let days = (now - last_accessed).max(0) as f64 / DAY_MS as f64;
    (RECENCY_CEILING * (1.0 - days / RECENCY_WINDOW_DAYS)).max(0.0)
}

#[must_use]
pub fn difficulty_weight(level: DifficultyLevel) -> f64 {
    match level {
        DifficultyLevel::Beginner => 20.0,
        DifficultyLevel::Intermediate => 10.0,
        DifficultyLevel::Advanced => 0.0,
    }
}

#[must_use]
pub fn explicit_priority_weight(priority: Option<Priority>) -> f64 {
    match priority {
        None | Some(Priority::Low) => 0.0,
        Some(Priority::Medium) => 25.0,
        Some(Priority::High) => 50.0,
        Some(Priority::Critical) => 100.0,
    }
}

#[must_use]
pub fn priority_score(content: &CachedContent, now: i64) -> f64 {
    f64::from(content.access_count) * ACCESS_WEIGHT
        + recency_weight(content.last_accessed, now)
        + difficulty_weight(content.item.difficulty())
        + explicit_priority_weight(content.item.explicit_priority())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::types::{ContentItem, VocabularyItem};

    #[test]
    fn test_recency_decays_linearly() {
        assert_eq!(recency_weight(0, 0), 30.0);
        assert!((recency_weight(0, 15 * DAY_MS) - 15.0).abs() < 1e-9);
        assert_eq!(recency_weight(0, 30 * DAY_MS), 0.0);
        assert_eq!(recency_weight(0, 90 * DAY_MS), 0.0);
    }

    #[test]
    fn test_score_components() {
        let content = CachedContent {
            item: ContentItem::Vocabulary(VocabularyItem {
                id: "v1".into(),
                word: "casa".into(),
                translation: "house".into(),
                difficulty: DifficultyLevel::Beginner,
                mastery_level: 0.2,
                example: None,
            }),
            cached_at: 0,
            last_accessed: 0,
            access_count: 3,
            priority_score: 0.0,
            size_bytes: 10,
            newly_cached: false,
        };
        // 3*10 + 30 + 20 + 0
        assert_eq!(priority_score(&content, 0), 80.0);
    }
}
