use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Spaced-repetition state for one word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyProgress {
    pub word: String,
    pub interval_days: u32,
    pub ease_factor: f64,
    pub repetitions: u32,
    /// Epoch millis of the next scheduled review
    pub next_review: i64,
    /// 0.0 - 1.0
    pub mastery_level: f64,
    #[serde(default)]
    pub correct_count: u32,
    #[serde(default)]
    pub incorrect_count: u32,
    #[serde(default)]
    pub last_reviewed: i64,
}

impl VocabularyProgress {
    #[must_use]
    pub fn new(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            interval_days: 0,
            ease_factor: 2.5,
            repetitions: 0,
            next_review: 0,
            mastery_level: 0.0,
            correct_count: 0,
            incorrect_count: 0,
            last_reviewed: 0,
        }
    }

    /// True when scheduling state differs from `other`.
    #[must_use]
    pub fn schedule_differs(&self, other: &Self) -> bool {
        self.interval_days != other.interval_days
            || self.repetitions != other.repetitions
            || self.next_review != other.next_review
            || (self.ease_factor - other.ease_factor).abs() > f64::EPSILON
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrammarProgress {
    pub concept: String,
    pub mastery_level: f64,
    pub exercises_completed: u32,
    pub correct_count: u32,
    pub last_practiced: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub session_id: String,
    pub passage_id: String,
    pub words_read: u32,
    pub comprehension_score: f64,
    pub completed_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRecord {
    pub session_id: String,
    pub questions: u32,
    pub correct: u32,
    pub score: f64,
    pub completed_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalizedPlan {
    pub plan_id: String,
    pub current_week: u32,
    #[serde(default)]
    pub completed_goals: BTreeSet<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
    pub last_updated: i64,
}

/// Progress document mirrored on every device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningProgress {
    pub user_id: String,
    #[serde(default)]
    pub vocabulary: BTreeMap<String, VocabularyProgress>,
    #[serde(default)]
    pub grammar: BTreeMap<String, GrammarProgress>,
    /// Keyed by session id
    #[serde(default)]
    pub reading_sessions: BTreeMap<String, ReadingRecord>,
    /// Keyed by session id
    #[serde(default)]
    pub quiz_sessions: BTreeMap<String, QuizRecord>,
    #[serde(default)]
    pub plan: Option<PersonalizedPlan>,
    #[serde(default)]
    pub last_updated: i64,
}

impl LearningProgress {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn upsert_word(&mut self, progress: VocabularyProgress) {
        self.vocabulary.insert(progress.word.clone(), progress);
    }

    /// Words with mastery below `threshold`, sorted.
    #[must_use]
    pub fn weak_words(&self, threshold: f64) -> Vec<String> {
        self.vocabulary
            .values()
            .filter(|v| v.mastery_level < threshold)
            .map(|v| v.word.clone())
            .collect()
    }
}
