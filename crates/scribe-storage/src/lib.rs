//! Scribe Storage Backends
//!
//! Pluggable persistence for document snapshots:
//! - Memory (default): Fast, volatile storage
//! - SQLite: Embedded persistence

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
