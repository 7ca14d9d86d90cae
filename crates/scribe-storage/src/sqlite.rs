//! SQLite storage backend

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use scribe_core::{Comment, DocumentRecord, DocumentStore, ScopeKey, StoreError, StoredUser};

/// Embedded persistence suitable for single-node deployments. The document
/// tree, comments, and user list are stored as JSON; the step log stays the
/// opaque blob the engine produced.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database at the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                namespace TEXT NOT NULL,
                lesson TEXT NOT NULL,
                component TEXT NOT NULL,
                version INTEGER NOT NULL,
                doc TEXT NOT NULL,
                comments TEXT NOT NULL,
                steps BLOB NOT NULL,
                users TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000),
                PRIMARY KEY (namespace, lesson, component)
            );
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn load(&self, key: &ScopeKey) -> Result<Option<DocumentRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(u64, String, String, Vec<u8>, String)> = conn
            .query_row(
                r#"
                SELECT version, doc, comments, steps, users FROM documents
                WHERE namespace = ?1 AND lesson = ?2 AND component = ?3
                "#,
                params![key.namespace, key.lesson, key.component],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        match row {
            Some((version, doc, comments, steps, users)) => {
                let doc = serde_json::from_str(&doc)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let comments: Vec<Comment> = serde_json::from_str(&comments)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                let users: Vec<StoredUser> = serde_json::from_str(&users)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(DocumentRecord {
                    version,
                    doc,
                    comments,
                    steps,
                    users,
                }))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, key: &ScopeKey, record: DocumentRecord) -> Result<(), StoreError> {
        let doc = serde_json::to_string(&record.doc)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let comments = serde_json::to_string(&record.comments)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let users = serde_json::to_string(&record.users)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO documents (namespace, lesson, component, version, doc, comments, steps, users, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, strftime('%s', 'now') * 1000)
            ON CONFLICT(namespace, lesson, component) DO UPDATE SET
                version = excluded.version,
                doc = excluded.doc,
                comments = excluded.comments,
                steps = excluded.steps,
                users = excluded.users,
                updated_at = excluded.updated_at
            "#,
            params![
                key.namespace,
                key.lesson,
                key.component,
                record.version,
                doc,
                comments,
                record.steps,
                users
            ],
        )
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    async fn version(&self, key: &ScopeKey) -> Result<Option<u64>, StoreError> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            r#"
            SELECT version FROM documents
            WHERE namespace = ?1 AND lesson = ?2 AND component = ?3
            "#,
            params![key.namespace, key.lesson, key.component],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StoreError::Database(e.to_string()))
    }
}
