//! Domain cache for learning content, offline sessions and analytics.
//!
//! # Collections
//!
//! Four collections (passages, vocabulary, quiz questions, cultural
//! insights) are keyed by item id and merged on re-cache. After every
//! merge a collection is trimmed: items past the retention window go first,
//! then the lowest-scoring items until the count and byte budgets hold.
//!
//! # Sessions
//!
//! At most one [`OfflineSession`] is open. Ending a session enqueues it on
//! the shared [`crate::sync::SyncQueue`].

pub mod analytics;
mod manager;
pub mod scoring;
pub mod session;
pub mod types;

pub use analytics::{ContentEngagement, OfflineAnalytics, PerformanceMetrics, UsagePatterns};
pub use manager::{CacheReport, CollectionStats, ContentCacheManager, ContentCacheStats};
pub use session::{
    Activity, ActivityPerformance, OfflineSession, SessionStats, SessionSyncStatus, SessionType,
};
pub use types::{
    CachedContent, ContentItem, ContentKind, CulturalInsight, DifficultyLevel, Passage,
    QuizQuestion, VocabularyItem,
};

use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("unknown content kind '{0}'")]
    UnknownKind(String),

    #[error("item '{id}' is {found}, expected {expected}")]
    KindMismatch {
        id: String,
        expected: ContentKind,
        found: ContentKind,
    },

    #[error("content cache has been disposed")]
    Disposed,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
