use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A user-visible setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl SettingValue {
    /// Total order used only to break timestamp ties deterministically.
    pub(crate) fn tie_key(&self) -> String {
        match self {
            Self::Flag(b) => format!("0:{}", b),
            Self::Number(n) => format!("1:{:020.6}", n),
            Self::Text(s) => format!("2:{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub value: SettingValue,
    /// Epoch millis of the last change on the device that wrote it
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub title: String,
    pub unlocked_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetencyScore {
    pub score: f64,
    pub last_updated: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialFeatures {
    pub friends_count: u32,
    pub shared_achievements: u32,
    pub study_streak_days: u32,
    pub last_updated: i64,
}

/// Profile document mirrored on every device.
///
/// Achievement ids are unique; `achievements` is kept sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, Setting>,
    #[serde(default)]
    pub achievements: Vec<Achievement>,
    #[serde(default)]
    pub cultural_competency: BTreeMap<String, CompetencyScore>,
    #[serde(default)]
    pub social: SocialFeatures,
    /// Platform name → last active (epoch millis)
    #[serde(default)]
    pub platform_activity: BTreeMap<String, i64>,
    #[serde(default)]
    pub last_updated: i64,
}

impl UserProfile {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Add or replace an achievement, keeping ids unique and sorted.
    pub fn unlock(&mut self, achievement: Achievement) {
        match self
            .achievements
            .binary_search_by(|a| a.id.as_str().cmp(achievement.id.as_str()))
        {
            Ok(pos) => self.achievements[pos] = achievement,
            Err(pos) => self.achievements.insert(pos, achievement),
        }
    }

    pub fn set_preference(&mut self, name: impl Into<String>, value: SettingValue, at: i64) {
        self.preferences.insert(
            name.into(),
            Setting {
                value,
                last_updated: at,
            },
        );
        self.last_updated = self.last_updated.max(at);
    }

    #[must_use]
    pub fn achievement_ids(&self) -> Vec<&str> {
        self.achievements.iter().map(|a| a.id.as_str()).collect()
    }
}
