//! Offline study sessions.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Vocabulary,
    Reading,
    Quiz,
    Cultural,
}

impl SessionType {
    /// Sync priority: vocabulary 4, reading 3, quiz 2, cultural 1.
    #[must_use]
    pub fn priority_level(&self) -> u32 {
        match self {
            Self::Vocabulary => 4,
            Self::Reading => 3,
            Self::Quiz => 2,
            Self::Cultural => 1,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vocabulary => "vocabulary",
            Self::Reading => "reading",
            Self::Quiz => "quiz",
            Self::Cultural => "cultural",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionSyncStatus {
    #[default]
    Pending,
    Synced,
    Conflict,
}

/// Outcome of one activity, by activity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityPerformance {
    Vocabulary {
        word: String,
        correct: bool,
        response_time_ms: u64,
        mastery_level: f64,
    },
    Reading {
        passage_id: String,
        words_read: u32,
        /// 0.0 - 1.0
        comprehension_score: f64,
    },
    Quiz {
        question_id: String,
        correct: bool,
        points: u32,
    },
    Cultural {
        insight_id: String,
        engaged_seconds: u32,
    },
}

impl ActivityPerformance {
    /// Accuracy contribution in 0.0 - 1.0, `None` for ungraded activities.
    #[must_use]
    pub fn accuracy(&self) -> Option<f64> {
        match self {
            Self::Vocabulary { correct, .. } | Self::Quiz { correct, .. } => {
                Some(if *correct { 1.0 } else { 0.0 })
            }
            Self::Reading {
                comprehension_score,
                ..
            } => Some(comprehension_score.clamp(0.0, 1.0)),
            Self::Cultural { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub activity_type: String,
    pub content_id: String,
    pub performance: ActivityPerformance,
    pub completed: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub total_activities: u32,
    pub completed_activities: u32,
    pub graded_activities: u32,
    /// Mean accuracy over graded activities, 0.0 when none are graded
    pub accuracy: f64,
    pub words_studied: u32,
    pub points: u32,
}

impl SessionStats {
    #[must_use]
    pub fn from_activities(activities: &[Activity]) -> Self {
        let mut stats = Self::default();
        let mut accuracy_sum = 0.0;
        for activity in activities {
            stats.total_activities = stats.total_activities.saturating_add(1);
            if activity.completed {
                stats.completed_activities = stats.completed_activities.saturating_add(1);
            }
            if let Some(acc) = activity.performance.accuracy() {
                stats.graded_activities = stats.graded_activities.saturating_add(1);
                accuracy_sum += acc;
            }
            match &activity.performance {
                ActivityPerformance::Vocabulary { .. } => {
                    stats.words_studied = stats.words_studied.saturating_add(1);
                }
                ActivityPerformance::Quiz { points, .. } => {
                    stats.points = stats.points.saturating_add(*points);
                }
                _ => {}
            }
        }
        if stats.graded_activities > 0 {
            stats.accuracy = accuracy_sum / f64::from(stats.graded_activities);
        }
        stats
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineSession {
    pub session_id: String,
    pub session_type: SessionType,
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub stats: SessionStats,
    #[serde(default)]
    pub sync_status: SessionSyncStatus,
    pub priority_level: u32,
}

impl OfflineSession {
    #[must_use]
    pub fn new(session_id: String, session_type: SessionType, now: i64) -> Self {
        Self {
            session_id,
            session_type,
            start_time: now,
            end_time: None,
            duration_seconds: None,
            activities: Vec::new(),
            stats: SessionStats::default(),
            sync_status: SessionSyncStatus::Pending,
            priority_level: session_type.priority_level(),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn record(&mut self, activity: Activity) {
        self.activities.push(activity);
        self.stats = SessionStats::from_activities(&self.activities);
    }

    pub fn finish(&mut self, now: i64) {
        let end = now.max(self.start_time);
        self.end_time = Some(end);
        self.duration_seconds = Some(((end - self.start_time) / 1000) as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(correct: bool) -> Activity {
        Activity {
            activity_type: "flashcard".into(),
            content_id: "v1".into(),
            performance: ActivityPerformance::Vocabulary {
                word: "perro".into(),
                correct,
                response_time_ms: 900,
                mastery_level: 0.4,
            },
            completed: true,
            timestamp: 0,
        }
    }

    #[test]
    fn test_stats_recomputed_on_record() {
        let mut session = OfflineSession::new("s1".into(), SessionType::Vocabulary, 0);
        session.record(vocab(true));
        session.record(vocab(false));
        session.record(Activity {
            activity_type: "insight".into(),
            content_id: "c1".into(),
            performance: ActivityPerformance::Cultural {
                insight_id: "c1".into(),
                engaged_seconds: 40,
            },
            completed: false,
            timestamp: 1,
        });

        assert_eq!(session.stats.total_activities, 3);
        assert_eq!(session.stats.completed_activities, 2);
        assert_eq!(session.stats.graded_activities, 2);
        assert_eq!(session.stats.accuracy, 0.5);
        assert_eq!(session.stats.words_studied, 2);
    }

    #[test]
    fn test_stats_saturate_instead_of_overflowing() {
        let quiz = |id: &str| Activity {
            activity_type: "quiz".into(),
            content_id: id.into(),
            performance: ActivityPerformance::Quiz {
                question_id: id.into(),
                correct: true,
                points: u32::MAX,
            },
            completed: true,
            timestamp: 0,
        };
        let mut session = OfflineSession::new("s1".into(), SessionType::Quiz, 0);
        session.record(quiz("q1"));
        session.record(quiz("q2"));

        assert_eq!(session.stats.points, u32::MAX);
        assert_eq!(session.stats.total_activities, 2);
        assert_eq!(session.stats.accuracy, 1.0);
    }

    #[test]
    fn test_finish_stamps_duration() {
        let mut session = OfflineSession::new("s1".into(), SessionType::Quiz, 10_000);
        assert!(session.is_open());
        session.finish(95_500);
        assert_eq!(session.end_time, Some(95_500));
        assert_eq!(session.duration_seconds, Some(85));
        assert_eq!(session.priority_level, 2);
    }
}
