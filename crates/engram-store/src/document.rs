//! Document store backed by SQLite.
//!
//! The only adapter with its own durable on-disk format. Items are stored as
//! one row each; metadata is a JSON text column and embeddings are
//! little-endian f32 BLOBs.

use crate::adapter::{order_and_limit, StoreAdapter};
use async_trait::async_trait;
use chrono::Utc;
use engram_types::{MemoryId, MemoryItem, MemoryType, QueryCriteria, StoreError};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// SQLite-backed document store.
#[derive(Clone)]
pub struct DocumentStore {
    name: String,
    conn: Arc<Mutex<Connection>>,
}

impl DocumentStore {
    /// Open (or create) a document store at the given path.
    pub fn open(name: impl Into<String>, path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Io(e.to_string()))?;
        Self::from_connection(name, conn)
    }

    /// Open an in-memory document store. Used by tests and as a lightweight
    /// replica target.
    pub fn open_in_memory(name: impl Into<String>) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Io(e.to_string()))?;
        Self::from_connection(name, conn)
    }

    fn from_connection(name: impl Into<String>, conn: Connection) -> Result<Self, StoreError> {
        crate::migration::run_migrations(&conn).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Io(format!("connection lock poisoned: {e}")))
    }
}

#[async_trait]
impl StoreAdapter for DocumentStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, item: MemoryItem) -> Result<MemoryId, StoreError> {
        let conn = self.lock()?;

        // Stale-write check: the resident row wins if strictly newer.
        let existing: Option<String> = conn
            .query_row(
                "SELECT updated_at FROM memory_items WHERE id = ?1",
                rusqlite::params![item.id.to_string()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Io(other.to_string())),
            })?;
        if let Some(resident) = existing {
            let resident_at = chrono::DateTime::parse_from_rfc3339(&resident)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::SchemaViolation(format!("bad updated_at row: {e}")))?;
            if resident_at > item.updated_at {
                return Err(StoreError::Conflict {
                    id: item.id,
                    reason: format!(
                        "resident item is newer ({} > {})",
                        resident_at, item.updated_at
                    ),
                });
            }
        }

        let metadata = serde_json::to_string(&item.metadata)
            .map_err(|e| StoreError::SchemaViolation(e.to_string()))?;
        let type_str = item.memory_type.to_string();
        let embedding_blob = item.embedding.as_deref().map(embedding_to_blob);

        conn.execute(
            "INSERT INTO memory_items (id, content, memory_type, embedding, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 content = ?2, memory_type = ?3, embedding = ?4, metadata = ?5, updated_at = ?7",
            rusqlite::params![
                item.id.to_string(),
                item.content,
                type_str,
                embedding_blob,
                metadata,
                item.created_at.to_rfc3339(),
                item.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| StoreError::Io(e.to_string()))?;

        debug!(store = %self.name, id = %item.id, memory_type = %type_str, "stored document");
        Ok(item.id)
    }

    async fn retrieve(&self, id: MemoryId) -> Result<MemoryItem, StoreError> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT id, content, memory_type, embedding, metadata, created_at, updated_at
             FROM memory_items WHERE id = ?1",
            rusqlite::params![id.to_string()],
            row_to_raw,
        );
        match result {
            Ok(raw) => raw.into_item(),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound(id)),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    async fn query(&self, criteria: &QueryCriteria) -> Result<Vec<MemoryItem>, StoreError> {
        let conn = self.lock()?;

        // Push the type filter into SQL; everything else post-filters.
        let mut sql = String::from(
            "SELECT id, content, memory_type, embedding, metadata, created_at, updated_at
             FROM memory_items WHERE 1=1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        if let Some(mt) = criteria.memory_type {
            sql.push_str(" AND memory_type = ?1");
            params.push(Box::new(mt.to_string()));
        }

        let mut stmt = conn.prepare(&sql).map_err(|e| StoreError::Io(e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), row_to_raw)
            .map_err(|e| StoreError::Io(e.to_string()))?;

        let mut items = Vec::new();
        for row in rows {
            let item = row.map_err(|e| StoreError::Io(e.to_string()))?.into_item()?;
            if criteria.matches(&item) {
                items.push(item);
            }
        }
        Ok(order_and_limit(items, criteria))
    }

    async fn delete(&self, id: MemoryId) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let affected = conn
            .execute(
                "DELETE FROM memory_items WHERE id = ?1",
                rusqlite::params![id.to_string()],
            )
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(affected > 0)
    }
}

/// Raw row before parsing into a MemoryItem.
struct RawRow {
    id: String,
    content: String,
    memory_type: String,
    embedding: Option<Vec<u8>>,
    metadata: String,
    created_at: String,
    updated_at: String,
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        content: row.get(1)?,
        memory_type: row.get(2)?,
        embedding: row.get(3)?,
        metadata: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl RawRow {
    fn into_item(self) -> Result<MemoryItem, StoreError> {
        let id = uuid::Uuid::parse_str(&self.id)
            .map(MemoryId)
            .map_err(|e| StoreError::SchemaViolation(format!("bad id '{}': {e}", self.id)))?;
        let memory_type = parse_memory_type(&self.memory_type)?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_str(&self.metadata)
            .map_err(|e| StoreError::SchemaViolation(format!("bad metadata: {e}")))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::SchemaViolation(format!("bad created_at: {e}")))?;
        let updated_at = chrono::DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::SchemaViolation(format!("bad updated_at: {e}")))?;
        Ok(MemoryItem {
            id,
            content: self.content,
            memory_type,
            embedding: self.embedding.as_deref().map(blob_to_embedding),
            metadata,
            created_at,
            updated_at,
        })
    }
}

fn parse_memory_type(s: &str) -> Result<MemoryType, StoreError> {
    match s {
        "working" => Ok(MemoryType::Working),
        "long_term" => Ok(MemoryType::LongTerm),
        "episodic" => Ok(MemoryType::Episodic),
        "semantic" => Ok(MemoryType::Semantic),
        "solution" => Ok(MemoryType::Solution),
        "error_log" => Ok(MemoryType::ErrorLog),
        "checkpoint" => Ok(MemoryType::Checkpoint),
        other => Err(StoreError::SchemaViolation(format!(
            "unknown memory type '{other}'"
        ))),
    }
}

/// Encode an embedding as little-endian f32 bytes.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode little-endian f32 bytes back into an embedding.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup() -> DocumentStore {
        DocumentStore::open_in_memory("doc-test").unwrap()
    }

    #[tokio::test]
    async fn test_store_and_retrieve_round_trip() {
        let store = setup();
        let item = MemoryItem::new("persist me", MemoryType::LongTerm)
            .with_metadata("origin", serde_json::json!("test"))
            .with_embedding(vec![0.5, -0.25, 1.0]);
        let id = store.store(item.clone()).await.unwrap();
        let back = store.retrieve(id).await.unwrap();
        assert_eq!(back.content, item.content);
        assert_eq!(back.memory_type, item.memory_type);
        assert_eq!(back.embedding, item.embedding);
        assert_eq!(back.metadata, item.metadata);
        // RFC3339 storage keeps sub-second precision within a microsecond.
        assert_eq!(back.created_at.timestamp_micros(), item.created_at.timestamp_micros());
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_not_found() {
        let store = setup();
        let id = MemoryId::new();
        assert!(matches!(
            store.retrieve(id).await,
            Err(StoreError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_stale_write_conflicts() {
        let store = setup();
        let mut item = MemoryItem::new("v1", MemoryType::Working);
        store.store(item.clone()).await.unwrap();

        item.content = "v2".into();
        item.updated_at = item.updated_at + Duration::seconds(1);
        store.store(item.clone()).await.unwrap();
        assert_eq!(store.retrieve(item.id).await.unwrap().content, "v2");

        // A write with an older timestamp is rejected.
        let mut stale = item.clone();
        stale.content = "v0".into();
        stale.updated_at = item.updated_at - Duration::seconds(5);
        assert!(matches!(
            store.store(stale).await,
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(store.retrieve(item.id).await.unwrap().content, "v2");
    }

    #[tokio::test]
    async fn test_query_by_type_and_limit() {
        let store = setup();
        for i in 0..5 {
            store
                .store(MemoryItem::new(format!("fact {i}"), MemoryType::Semantic))
                .await
                .unwrap();
        }
        store
            .store(MemoryItem::new("scratch", MemoryType::Working))
            .await
            .unwrap();

        let all = store
            .query(&QueryCriteria::of_type(MemoryType::Semantic))
            .await
            .unwrap();
        assert_eq!(all.len(), 5);

        let capped = store
            .query(&QueryCriteria::of_type(MemoryType::Semantic).with_limit(2))
            .await
            .unwrap();
        assert_eq!(capped.len(), 2);
    }

    #[tokio::test]
    async fn test_query_text_contains() {
        let store = setup();
        store
            .store(MemoryItem::new("the borrow checker", MemoryType::Semantic))
            .await
            .unwrap();
        store
            .store(MemoryItem::new("garbage collection", MemoryType::Semantic))
            .await
            .unwrap();
        let hits = store
            .query(&QueryCriteria::containing("Borrow"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("borrow"));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = setup();
        let item = MemoryItem::new("gone soon", MemoryType::Working);
        let id = store.store(item).await.unwrap();
        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(matches!(
            store.retrieve(id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_on_disk_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engram.db");
        let id = {
            let store = DocumentStore::open("disk", &path).unwrap();
            store
                .store(MemoryItem::new("durable", MemoryType::LongTerm))
                .await
                .unwrap()
        };
        let reopened = DocumentStore::open("disk", &path).unwrap();
        assert_eq!(reopened.retrieve(id).await.unwrap().content, "durable");
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let embedding = vec![0.0, 1.5, -2.25, f32::MIN_POSITIVE];
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob_to_embedding(&blob), embedding);
    }
}
