//! Learning content held by the content cache.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::Priority;

use super::ContentError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    /// Editorial priority assigned by the content source
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub word_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyItem {
    pub id: String,
    pub word: String,
    pub translation: String,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    /// Learner mastery, 0.0 - 1.0
    #[serde(default)]
    pub mastery_level: f64,
    #[serde(default)]
    pub example: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CulturalInsight {
    pub id: String,
    pub title: String,
    pub region: String,
    pub body: String,
    #[serde(default)]
    pub difficulty: DifficultyLevel,
}

/// Any cacheable piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentItem {
    Passage(Passage),
    Vocabulary(VocabularyItem),
    Quiz(QuizQuestion),
    Cultural(CulturalInsight),
}

impl ContentItem {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Passage(p) => &p.id,
            Self::Vocabulary(v) => &v.id,
            Self::Quiz(q) => &q.id,
            Self::Cultural(c) => &c.id,
        }
    }

    /// Collection this item belongs in.
    #[must_use]
    pub fn kind(&self) -> ContentKind {
        match self {
            Self::Passage(_) => ContentKind::Passages,
            Self::Vocabulary(_) => ContentKind::Vocabulary,
            Self::Quiz(_) => ContentKind::QuizQuestions,
            Self::Cultural(_) => ContentKind::CulturalInsights,
        }
    }

    #[must_use]
    pub fn difficulty(&self) -> DifficultyLevel {
        match self {
            Self::Passage(p) => p.difficulty,
            Self::Vocabulary(v) => v.difficulty,
            Self::Quiz(q) => q.difficulty,
            Self::Cultural(c) => c.difficulty,
        }
    }

    /// Source-assigned priority; only passages carry one.
    #[must_use]
    pub fn explicit_priority(&self) -> Option<Priority> {
        match self {
            Self::Passage(p) => Some(p.priority),
            _ => None,
        }
    }
}

/// The four content collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Passages,
    Vocabulary,
    QuizQuestions,
    CulturalInsights,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        Self::Passages,
        Self::Vocabulary,
        Self::QuizQuestions,
        Self::CulturalInsights,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passages => "passages",
            Self::Vocabulary => "vocabulary",
            Self::QuizQuestions => "quiz_questions",
            Self::CulturalInsights => "cultural_insights",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = ContentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "passages" => Ok(Self::Passages),
            "vocabulary" => Ok(Self::Vocabulary),
            "quiz_questions" | "quiz" => Ok(Self::QuizQuestions),
            "cultural_insights" | "cultural" => Ok(Self::CulturalInsights),
            other => Err(ContentError::UnknownKind(other.to_string())),
        }
    }
}

/// A content item plus its cache bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedContent {
    pub item: ContentItem,
    pub cached_at: i64,
    pub last_accessed: i64,
    pub access_count: u32,
    pub priority_score: f64,
    pub size_bytes: usize,
    /// True until the same id is cached again
    #[serde(default)]
    pub newly_cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("passages".parse::<ContentKind>().unwrap(), ContentKind::Passages);
        assert_eq!("quiz".parse::<ContentKind>().unwrap(), ContentKind::QuizQuestions);
        assert!(matches!(
            "videos".parse::<ContentKind>(),
            Err(ContentError::UnknownKind(k)) if k == "videos"
        ));
    }

    #[test]
    fn test_item_is_tagged() {
        let item = ContentItem::Passage(Passage {
            id: "p1".into(),
            title: "El mercado".into(),
            text: "...".into(),
            language: "es".into(),
            difficulty: DifficultyLevel::Beginner,
            priority: Priority::High,
            word_count: 120,
        });
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["kind"], "passage");
        assert_eq!(json["priority"], "high");

        let back: ContentItem = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), ContentKind::Passages);
        assert_eq!(back.explicit_priority(), Some(Priority::High));
    }
}
