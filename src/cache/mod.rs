//! Generic bounded key/value cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Cache Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  entry.rs     - CacheEntry<T>, Priority tiers                │
//! │  eviction.rs  - EvictionStrategy + SmartPolicy scoring       │
//! │  events.rs    - CacheEvent stream (broadcast)                │
//! │  store.rs     - CacheStore<T>: set/get/invalidate/stats,     │
//! │                 expiry sweep, snapshot persistence           │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod entry;
pub mod eviction;
pub mod events;
pub mod store;

pub use entry::{CacheEntry, Priority};
pub use eviction::{EvictionStrategy, SmartPolicy, SmartWeights};
pub use events::{CacheEvent, CacheEventKind, InvalidationCause};
pub use store::{CacheError, CacheStats, CacheStore, SetOptions};
