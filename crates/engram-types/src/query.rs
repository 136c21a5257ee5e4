//! Query criteria accepted by every store adapter.

use crate::item::{MemoryItem, MemoryType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Filter criteria for memory queries.
///
/// Every backend accepts the same criteria regardless of its physical
/// storage model; fields a backend cannot accelerate are applied as a
/// post-filter. Results are finite; a query is restarted by re-issuing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryCriteria {
    /// Filter by memory type.
    pub memory_type: Option<MemoryType>,
    /// Case-insensitive substring match on content.
    pub text_contains: Option<String>,
    /// Metadata key-value equality filters (all must match).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Only items created after this time.
    pub after: Option<DateTime<Utc>>,
    /// Only items created before this time.
    pub before: Option<DateTime<Utc>>,
    /// Rank by cosine similarity against this embedding (vector backends).
    pub similar_to: Option<Vec<f32>>,
    /// Maximum number of items to return.
    pub limit: Option<usize>,
}

impl QueryCriteria {
    /// Criteria matching a specific memory type.
    pub fn of_type(memory_type: MemoryType) -> Self {
        Self {
            memory_type: Some(memory_type),
            ..Default::default()
        }
    }

    /// Criteria matching content containing the given text.
    pub fn containing(text: impl Into<String>) -> Self {
        Self {
            text_contains: Some(text.into()),
            ..Default::default()
        }
    }

    /// Cap the number of results (builder style).
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add a metadata equality filter (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether an item satisfies every filter except similarity ranking.
    ///
    /// Similarity (`similar_to`) is an ordering concern, not a predicate, so
    /// backends apply it separately after filtering.
    pub fn matches(&self, item: &MemoryItem) -> bool {
        if let Some(mt) = self.memory_type {
            if item.memory_type != mt {
                return false;
            }
        }
        if let Some(ref text) = self.text_contains {
            if !item
                .content
                .to_lowercase()
                .contains(&text.to_lowercase())
            {
                return false;
            }
        }
        for (key, expected) in &self.metadata {
            if item.metadata.get(key) != Some(expected) {
                return false;
            }
        }
        if let Some(after) = self.after {
            if item.created_at <= after {
                return false;
            }
        }
        if let Some(before) = self.before {
            if item.created_at >= before {
                return false;
            }
        }
        true
    }
}
