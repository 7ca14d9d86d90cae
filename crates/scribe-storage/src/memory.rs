//! In-memory storage backend

use async_trait::async_trait;
use dashmap::DashMap;
use scribe_core::{DocumentRecord, DocumentStore, ScopeKey, StoreError};

/// Volatile store backed by a concurrent map. Suitable for tests and
/// deployments that treat documents as session-scoped.
#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<ScopeKey, DocumentRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, key: &ScopeKey) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.records.get(key).map(|entry| entry.clone()))
    }

    async fn store(&self, key: &ScopeKey, record: DocumentRecord) -> Result<(), StoreError> {
        self.records.insert(key.clone(), record);
        Ok(())
    }

    async fn version(&self, key: &ScopeKey) -> Result<Option<u64>, StoreError> {
        Ok(self.records.get(key).map(|entry| entry.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_core::Node;

    fn key() -> ScopeKey {
        ScopeKey::new("course", "lesson", "essay").unwrap()
    }

    fn record(version: u64) -> DocumentRecord {
        DocumentRecord {
            version,
            doc: Node::empty_doc(),
            comments: vec![],
            steps: vec![],
            users: vec![],
        }
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.load(&key()).await.unwrap().is_none());
        assert!(store.version(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_and_load_round_trip() {
        let store = MemoryStore::new();
        store.store(&key(), record(3)).await.unwrap();
        let loaded = store.load(&key()).await.unwrap().unwrap();
        assert_eq!(loaded.version, 3);
        assert_eq!(store.version(&key()).await.unwrap(), Some(3));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_store_replaces_previous_record() {
        let store = MemoryStore::new();
        store.store(&key(), record(1)).await.unwrap();
        store.store(&key(), record(2)).await.unwrap();
        assert_eq!(store.version(&key()).await.unwrap(), Some(2));
        assert_eq!(store.len(), 1);
    }
}
