//! Graph store: items plus `related_to` adjacency.
//!
//! Edges are declared in item metadata — a `related_to` array of item id
//! strings — and indexed on store so neighborhood lookups don't rescan
//! every item's metadata.

use crate::adapter::{order_and_limit, reject_stale, StoreAdapter};
use async_trait::async_trait;
use dashmap::DashMap;
use engram_types::{MemoryId, MemoryItem, QueryCriteria, StoreError};
use uuid::Uuid;

/// Metadata key holding outgoing edges.
pub const RELATED_TO_KEY: &str = "related_to";

/// In-memory graph store.
pub struct GraphStore {
    name: String,
    items: DashMap<MemoryId, MemoryItem>,
    /// Outgoing edges per item, rebuilt on every upsert of the source.
    edges: DashMap<MemoryId, Vec<MemoryId>>,
}

impl GraphStore {
    /// Create an empty graph store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: DashMap::new(),
            edges: DashMap::new(),
        }
    }

    /// Items related to `id`, in either direction. The item itself is
    /// excluded; unknown neighbors (dangling edges) are skipped.
    pub fn related_items(&self, id: MemoryId) -> Vec<MemoryItem> {
        let mut neighbor_ids: Vec<MemoryId> = self
            .edges
            .get(&id)
            .map(|out| out.clone())
            .unwrap_or_default();
        for entry in self.edges.iter() {
            if *entry.key() != id && entry.value().contains(&id) {
                neighbor_ids.push(*entry.key());
            }
        }
        neighbor_ids.sort();
        neighbor_ids.dedup();
        neighbor_ids
            .into_iter()
            .filter(|n| *n != id)
            .filter_map(|n| self.items.get(&n).map(|e| e.clone()))
            .collect()
    }

    fn index_edges(&self, item: &MemoryItem) {
        let targets: Vec<MemoryId> = item
            .metadata
            .get(RELATED_TO_KEY)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| Uuid::parse_str(s).ok())
                    .map(MemoryId)
                    .collect()
            })
            .unwrap_or_default();
        if targets.is_empty() {
            self.edges.remove(&item.id);
        } else {
            self.edges.insert(item.id, targets);
        }
    }
}

#[async_trait]
impl StoreAdapter for GraphStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, item: MemoryItem) -> Result<MemoryId, StoreError> {
        if let Some(existing) = self.items.get(&item.id) {
            reject_stale(&existing, &item)?;
        }
        self.index_edges(&item);
        let id = item.id;
        self.items.insert(id, item);
        Ok(id)
    }

    async fn retrieve(&self, id: MemoryId) -> Result<MemoryItem, StoreError> {
        self.items
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(StoreError::NotFound(id))
    }

    async fn query(&self, criteria: &QueryCriteria) -> Result<Vec<MemoryItem>, StoreError> {
        let items: Vec<MemoryItem> = self
            .items
            .iter()
            .filter(|entry| criteria.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(order_and_limit(items, criteria))
    }

    async fn delete(&self, id: MemoryId) -> Result<bool, StoreError> {
        self.edges.remove(&id);
        Ok(self.items.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::MemoryType;

    fn link(item: MemoryItem, targets: &[MemoryId]) -> MemoryItem {
        let ids: Vec<serde_json::Value> = targets
            .iter()
            .map(|id| serde_json::json!(id.to_string()))
            .collect();
        item.with_metadata(RELATED_TO_KEY, serde_json::Value::Array(ids))
    }

    #[tokio::test]
    async fn test_related_items_both_directions() {
        let store = GraphStore::new("graph-test");
        let hub = MemoryItem::new("hub", MemoryType::Semantic);
        let hub_id = hub.id;
        store.store(hub).await.unwrap();

        // Incoming edge: declared on the spoke, pointing at the hub.
        let spoke_in = link(MemoryItem::new("points at hub", MemoryType::Semantic), &[hub_id]);
        let spoke_in_id = spoke_in.id;
        store.store(spoke_in).await.unwrap();

        let spoke_out = MemoryItem::new("pointed at by hub", MemoryType::Semantic);
        let spoke_out_id = spoke_out.id;
        store.store(spoke_out).await.unwrap();
        // Re-store hub with an outgoing edge.
        let mut hub2 = store.retrieve(hub_id).await.unwrap();
        hub2 = link(hub2, &[spoke_out_id]);
        hub2.updated_at = chrono::Utc::now();
        store.store(hub2).await.unwrap();

        let related = store.related_items(hub_id);
        let related_ids: Vec<MemoryId> = related.iter().map(|i| i.id).collect();
        assert!(related_ids.contains(&spoke_in_id));
        assert!(related_ids.contains(&spoke_out_id));
        assert_eq!(related.len(), 2);
    }

    #[tokio::test]
    async fn test_dangling_edges_are_skipped() {
        let store = GraphStore::new("graph-test");
        let ghost = MemoryId::new();
        let item = link(MemoryItem::new("edge to nowhere", MemoryType::Working), &[ghost]);
        let id = item.id;
        store.store(item).await.unwrap();
        assert!(store.related_items(id).is_empty());
    }

    #[tokio::test]
    async fn test_delete_drops_edges() {
        let store = GraphStore::new("graph-test");
        let target = MemoryItem::new("target", MemoryType::Working);
        let target_id = target.id;
        store.store(target).await.unwrap();
        let source = link(MemoryItem::new("source", MemoryType::Working), &[target_id]);
        let source_id = source.id;
        store.store(source).await.unwrap();

        assert_eq!(store.related_items(target_id).len(), 1);
        store.delete(source_id).await.unwrap();
        assert!(store.related_items(target_id).is_empty());
    }
}
