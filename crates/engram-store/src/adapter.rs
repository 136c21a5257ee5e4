//! The uniform persistence contract every backend implements.

use async_trait::async_trait;
use engram_types::{MemoryId, MemoryItem, QueryCriteria, StoreError};

/// The persistence contract implemented per physical backend.
///
/// Callers must not depend on backend-specific semantics: document, vector,
/// graph and key-value stores all answer the same four operations. Writes
/// are last-write-wins keyed upserts — an adapter rejects an upsert whose
/// `updated_at` is older than the resident row with [`StoreError::Conflict`],
/// which makes repeated application of the same delta batch safe.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Human-readable backend name for logs and sync reports.
    fn name(&self) -> &str;

    /// Persist an item, returning its id. Upserts on id.
    async fn store(&self, item: MemoryItem) -> Result<MemoryId, StoreError>;

    /// Fetch an item by id.
    async fn retrieve(&self, id: MemoryId) -> Result<MemoryItem, StoreError>;

    /// Return all items matching the criteria. Finite; restart by re-issuing.
    async fn query(&self, criteria: &QueryCriteria) -> Result<Vec<MemoryItem>, StoreError>;

    /// Remove an item. Returns whether it existed.
    async fn delete(&self, id: MemoryId) -> Result<bool, StoreError>;
}

/// A committed change awaiting propagation to replicas.
///
/// Deltas are keyed overwrites, never increments, so partial re-application
/// during sync retry is idempotent.
#[derive(Debug, Clone)]
pub enum Delta {
    /// The item was stored or replaced.
    Upsert(MemoryItem),
    /// The item was deleted.
    Delete(MemoryId),
}

impl Delta {
    /// The key this delta applies to.
    pub fn key(&self) -> MemoryId {
        match self {
            Delta::Upsert(item) => item.id,
            Delta::Delete(id) => *id,
        }
    }
}

/// Stale-write check shared by the in-memory adapters.
///
/// The incoming item wins ties (`>=`), so a replayed delta with an equal
/// timestamp is accepted rather than rejected.
pub(crate) fn reject_stale(
    existing: &MemoryItem,
    incoming: &MemoryItem,
) -> Result<(), StoreError> {
    if existing.updated_at > incoming.updated_at {
        return Err(StoreError::Conflict {
            id: incoming.id,
            reason: format!(
                "resident item is newer ({} > {})",
                existing.updated_at, incoming.updated_at
            ),
        });
    }
    Ok(())
}

/// Sort newest-first and truncate to the criteria limit.
///
/// Ties on `created_at` break by id so query output is deterministic.
pub(crate) fn order_and_limit(
    mut items: Vec<MemoryItem>,
    criteria: &QueryCriteria,
) -> Vec<MemoryItem> {
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    if let Some(limit) = criteria.limit {
        items.truncate(limit);
    }
    items
}
