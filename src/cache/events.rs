//! Observer events emitted by [`super::CacheStore`].
//!
//! Delivered over a `tokio::sync::broadcast` channel; a store with no
//! subscribers simply drops them.

use super::entry::Priority;
use super::eviction::EvictionStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEventKind {
    Set,
    Get,
    Delete,
    Clear,
    Invalidate,
    Cleanup,
    Evict,
}

/// What caused an invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationCause {
    Tag(String),
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    Set {
        key: String,
        size_bytes: usize,
        priority: Priority,
        replaced: bool,
    },
    Get {
        key: String,
        hit: bool,
    },
    Delete {
        key: String,
    },
    Clear {
        removed: usize,
    },
    Invalidate {
        cause: InvalidationCause,
        keys: Vec<String>,
    },
    Cleanup {
        keys: Vec<String>,
    },
    Evict {
        key: String,
        strategy: EvictionStrategy,
        size_bytes: usize,
    },
}

impl CacheEvent {
    #[must_use]
    pub fn kind(&self) -> CacheEventKind {
        match self {
            Self::Set { .. } => CacheEventKind::Set,
            Self::Get { .. } => CacheEventKind::Get,
            Self::Delete { .. } => CacheEventKind::Delete,
            Self::Clear { .. } => CacheEventKind::Clear,
            Self::Invalidate { .. } => CacheEventKind::Invalidate,
            Self::Cleanup { .. } => CacheEventKind::Cleanup,
            Self::Evict { .. } => CacheEventKind::Evict,
        }
    }

    /// Affected key for single-key events.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Set { key, .. } | Self::Get { key, .. } | Self::Delete { key } | Self::Evict { key, .. } => {
                Some(key)
            }
            Self::Clear { .. } | Self::Invalidate { .. } | Self::Cleanup { .. } => None,
        }
    }
}
