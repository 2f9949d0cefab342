//! Cross-device synchronization.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          SyncEngine                              │
//! │                                                                  │
//! │  profile:local ──┐                      ┌──► profile:local       │
//! │                  ├─► merge + conflicts ─┤                        │
//! │  profile:remote ─┘                      └──► profile:remote      │
//! │        (same for progress:local / progress:remote)               │
//! │                                                                  │
//! │  OfflineActivityBuffer ──► transport (per category)              │
//! │  SyncQueue (priority desc, created_at asc) ──► transport         │
//! │        timeout + backoff per request, attempts per drain pass    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only one full sync runs at a time; a concurrent call fails fast with
//! [`SyncError::AlreadySyncing`].

pub mod conflict;
mod engine;
pub mod merge;
pub mod queue;
pub mod transport;
pub mod types;

pub use engine::{keys, DrainReport, SyncEngine};
pub use queue::{DataType, SyncPayload, SyncQueue, SyncQueueItem, UserContent};
pub use transport::{
    OutboundRequest, SharedTransport, SyncTransport, TransportError, TransportResponse,
};
pub use types::{
    DataDomain, NetworkState, OfflineActivityBuffer, SyncError, SyncMeta, SyncMetrics,
    SyncResult, SyncState, SyncStatus,
};
