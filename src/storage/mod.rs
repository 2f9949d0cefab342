//! Persistent key-value storage adapters.
//!
//! Core logic only ever sees [`KvStorage`]. The composition root picks one
//! implementation at process start:
//!
//! - [`InMemoryStorage`]: `DashMap` backed, used in tests and when no disk is available
//! - [`SqliteStorage`]: single-table SQLite database through `sqlx`

pub mod traits;
pub mod memory;
pub mod sqlite;

pub use traits::{KvStorage, SharedStorage, StorageError};
pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;
