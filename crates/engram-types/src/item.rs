//! Memory items: the atomic unit of stored content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Unique identifier for a memory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryId(pub Uuid);

impl MemoryId {
    /// Create a new random MemoryId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MemoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of memory an item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Short-lived scratch state for the current task.
    Working,
    /// Durable knowledge that outlives sessions.
    LongTerm,
    /// A record of something that happened (conversation turn, tool run).
    Episodic,
    /// Distilled facts and concepts.
    Semantic,
    /// A solution or artifact worth reusing.
    Solution,
    /// A captured error and its context.
    ErrorLog,
    /// A snapshot of agent state for resumption.
    Checkpoint,
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemoryType::Working => "working",
            MemoryType::LongTerm => "long_term",
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Solution => "solution",
            MemoryType::ErrorLog => "error_log",
            MemoryType::Checkpoint => "checkpoint",
        };
        write!(f, "{s}")
    }
}

/// A single unit of stored memory.
///
/// Items are immutable once committed, except for metadata patches which
/// replace the stored row wholesale with a bumped `updated_at`. Backends that
/// index content populate `embedding`; everyone else carries it through
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique ID.
    pub id: MemoryId,
    /// The textual content of this item.
    pub content: String,
    /// What kind of memory this is.
    pub memory_type: MemoryType,
    /// Vector embedding, if an indexing backend has produced one.
    pub embedding: Option<Vec<f32>>,
    /// Arbitrary metadata.
    pub metadata: HashMap<String, serde_json::Value>,
    /// When this item was created.
    pub created_at: DateTime<Utc>,
    /// When this item was last written.
    pub updated_at: DateTime<Utc>,
}

impl MemoryItem {
    /// Create a new item with a fresh id and current timestamps.
    pub fn new(content: impl Into<String>, memory_type: MemoryType) -> Self {
        let now = Utc::now();
        Self {
            id: MemoryId::new(),
            content: content.into(),
            memory_type,
            embedding: None,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a metadata entry (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach an embedding (builder style).
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Apply a metadata patch, bumping `updated_at`.
    pub fn patch_metadata(&mut self, patch: HashMap<String, serde_json::Value>) {
        self.metadata.extend(patch);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_has_fresh_id_and_timestamps() {
        let item = MemoryItem::new("hello", MemoryType::Working);
        assert_eq!(item.content, "hello");
        assert_eq!(item.created_at, item.updated_at);
        assert!(item.embedding.is_none());
        assert!(item.metadata.is_empty());
    }

    #[test]
    fn test_item_serialization_round_trip() {
        let item = MemoryItem::new("fact", MemoryType::Semantic)
            .with_metadata("topic", serde_json::json!("rust"))
            .with_embedding(vec![0.1, 0.2, 0.3]);
        let json = serde_json::to_string(&item).unwrap();
        let back: MemoryItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn test_patch_metadata_bumps_updated_at() {
        let mut item = MemoryItem::new("x", MemoryType::Working);
        let before = item.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        let mut patch = HashMap::new();
        patch.insert("k".to_string(), serde_json::json!(1));
        item.patch_metadata(patch);
        assert!(item.updated_at > before);
        assert_eq!(item.metadata.get("k"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn test_memory_type_display() {
        assert_eq!(MemoryType::LongTerm.to_string(), "long_term");
        assert_eq!(MemoryType::Episodic.to_string(), "episodic");
    }
}
