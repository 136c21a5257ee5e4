//! In-process key-value store.
//!
//! Thread-safe via `DashMap`. The cheapest backend; also the default replica
//! target in tests.

use crate::adapter::{order_and_limit, reject_stale, StoreAdapter};
use async_trait::async_trait;
use dashmap::DashMap;
use engram_types::{MemoryId, MemoryItem, QueryCriteria, StoreError};

/// Concurrent in-memory key-value store.
pub struct KeyValueStore {
    name: String,
    items: DashMap<MemoryId, MemoryItem>,
}

impl KeyValueStore {
    /// Create an empty key-value store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: DashMap::new(),
        }
    }

    /// Number of items currently held.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl StoreAdapter for KeyValueStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, item: MemoryItem) -> Result<MemoryId, StoreError> {
        if let Some(existing) = self.items.get(&item.id) {
            reject_stale(&existing, &item)?;
        }
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
        Ok(self.items.remove(&id).is_some())
    }
}
