//! Persistence boundary
//!
//! The engine persists one [`DocumentRecord`] per scope key and loads it back
//! when an instance is hydrated. Backends implement [`DocumentStore`];
//! in-memory and SQLite implementations live in the storage crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::comment::Comment;
use crate::node::Node;
use crate::scope::ScopeKey;

/// A participant recorded in a snapshot. Only users with a durable identity
/// survive persistence; anonymous sessions are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub email: String,
    pub id: String,
}

/// Everything a snapshot captures about one document instance. The step log
/// is stored pre-encoded so backends treat it as an opaque blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub version: u64,
    pub doc: Node,
    pub comments: Vec<Comment>,
    pub steps: Vec<u8>,
    pub users: Vec<StoredUser>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(String),
    #[error("connection unavailable: {0}")]
    Connection(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the record for a key, `None` when nothing was ever stored.
    async fn load(&self, key: &ScopeKey) -> Result<Option<DocumentRecord>, StoreError>;

    /// Store a record, replacing any previous one for the key.
    async fn store(&self, key: &ScopeKey, record: DocumentRecord) -> Result<(), StoreError>;

    /// The persisted version for a key without loading the full record.
    async fn version(&self, key: &ScopeKey) -> Result<Option<u64>, StoreError>;
}
