//! Results, status and errors of the sync engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::content::{OfflineSession, SessionType};
use crate::model::LearningProgress;
use crate::storage::StorageError;

/// Engine state machine: `Idle -> Syncing -> Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    #[default]
    Online,
    Offline,
}

/// Document synchronized by a full sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataDomain {
    Profile,
    Progress,
}

impl DataDomain {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Progress => "progress",
        }
    }
}

impl fmt::Display for DataDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub duration_ms: u64,
    pub data_transferred_kb: f64,
    pub conflicts_detected: u32,
    pub items_synchronized: u32,
}

/// Outcome for one [`DataDomain`] of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub domain: DataDomain,
    pub success: bool,
    pub conflicts_resolved: u32,
    /// True when the persisted mirrors changed during this run
    pub data_merged: bool,
    pub errors: Vec<String>,
    pub metrics: SyncMetrics,
}

impl SyncResult {
    pub(crate) fn new(domain: DataDomain) -> Self {
        Self {
            domain,
            success: true,
            conflicts_resolved: 0,
            data_merged: false,
            errors: Vec::new(),
            metrics: SyncMetrics::default(),
        }
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.errors.push(error.into());
    }
}

/// Snapshot returned by [`super::SyncEngine::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    pub last_sync: Option<i64>,
    /// Conflicts counted by the last run
    pub pending_conflicts: u32,
    pub queue_len: usize,
    pub network: NetworkState,
}

/// Bookkeeping persisted under the `sync_meta` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMeta {
    #[serde(default)]
    pub last_sync: Option<i64>,
    /// Last time each domain's mirrors were rewritten
    #[serde(default)]
    pub last_merged: BTreeMap<DataDomain, i64>,
    #[serde(default)]
    pub last_conflicts: u32,
    #[serde(default)]
    pub runs: u64,
}

/// Activity recorded while offline and not yet uploaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfflineActivityBuffer {
    #[serde(default)]
    pub vocabulary_sessions: Vec<OfflineSession>,
    #[serde(default)]
    pub reading_sessions: Vec<OfflineSession>,
    #[serde(default)]
    pub quiz_sessions: Vec<OfflineSession>,
    /// Uploaded with the aggregate progress category
    #[serde(default)]
    pub cultural_sessions: Vec<OfflineSession>,
}

impl OfflineActivityBuffer {
    pub fn push(&mut self, session: OfflineSession) {
        match session.session_type {
            SessionType::Vocabulary => self.vocabulary_sessions.push(session),
            SessionType::Reading => self.reading_sessions.push(session),
            SessionType::Quiz => self.quiz_sessions.push(session),
            SessionType::Cultural => self.cultural_sessions.push(session),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vocabulary_sessions.is_empty()
            && self.reading_sessions.is_empty()
            && self.quiz_sessions.is_empty()
            && self.cultural_sessions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vocabulary_sessions.len()
            + self.reading_sessions.len()
            + self.quiz_sessions.len()
            + self.cultural_sessions.len()
    }
}

/// Body of the aggregate progress upload.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ProgressUpload<'a> {
    pub progress: Option<&'a LearningProgress>,
    pub cultural_sessions: &'a [OfflineSession],
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sync already in progress")]
    AlreadySyncing,

    #[error("sync cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_routes_by_session_type() {
        let mut buffer = OfflineActivityBuffer::default();
        buffer.push(OfflineSession::new("a".into(), SessionType::Vocabulary, 0));
        buffer.push(OfflineSession::new("b".into(), SessionType::Cultural, 0));

        assert_eq!(buffer.vocabulary_sessions.len(), 1);
        assert_eq!(buffer.cultural_sessions.len(), 1);
        assert_eq!(buffer.len(), 2);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_result_fail_flips_success() {
        let mut result = SyncResult::new(DataDomain::Profile);
        assert!(result.success);
        result.fail("no data");
        assert!(!result.success);
        assert_eq!(result.errors, vec!["no data".to_string()]);
    }
}
