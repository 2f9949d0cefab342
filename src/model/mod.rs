//! User-owned documents reconciled across devices.

pub mod profile;
pub mod progress;

pub use profile::{Achievement, CompetencyScore, Setting, SettingValue, SocialFeatures, UserProfile};
pub use progress::{
    GrammarProgress, LearningProgress, PersonalizedPlan, QuizRecord, ReadingRecord, VocabularyProgress,
};
