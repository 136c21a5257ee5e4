//! Embedding-indexed vector store.
//!
//! Items stored without an embedding get a deterministic content-hash
//! embedding so similarity ranking always has something to work with; a real
//! embedding provider can pre-populate `item.embedding` upstream. Queries
//! carrying `similar_to` are ranked by cosine similarity.

use crate::adapter::{order_and_limit, reject_stale, StoreAdapter};
use async_trait::async_trait;
use dashmap::DashMap;
use engram_types::{MemoryId, MemoryItem, QueryCriteria, StoreError};
use tracing::debug;

/// Default embedding dimension for the fallback hash embedding.
pub const DEFAULT_DIMENSION: usize = 64;

/// In-memory vector store with cosine similarity ranking.
pub struct VectorStore {
    name: String,
    dimension: usize,
    items: DashMap<MemoryId, MemoryItem>,
}

impl VectorStore {
    /// Create a vector store with the default embedding dimension.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_dimension(name, DEFAULT_DIMENSION)
    }

    /// Create a vector store with a specific embedding dimension.
    pub fn with_dimension(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension: dimension.max(1),
            items: DashMap::new(),
        }
    }

    /// The embedding dimension this store enforces.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Rank all items by cosine similarity against `embedding`, best first.
    pub fn nearest(&self, embedding: &[f32], k: usize) -> Vec<(MemoryItem, f32)> {
        let mut scored: Vec<(MemoryItem, f32)> = self
            .items
            .iter()
            .filter_map(|entry| {
                let item = entry.value();
                item.embedding
                    .as_deref()
                    .map(|e| (item.clone(), cosine_similarity(e, embedding)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

#[async_trait]
impl StoreAdapter for VectorStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&self, mut item: MemoryItem) -> Result<MemoryId, StoreError> {
        match item.embedding.as_deref() {
            Some(embedding) if embedding.len() != self.dimension => {
                return Err(StoreError::SchemaViolation(format!(
                    "embedding dimension {} does not match store dimension {}",
                    embedding.len(),
                    self.dimension
                )));
            }
            Some(_) => {}
            None => {
                item.embedding = Some(embed_text(&item.content, self.dimension));
                debug!(store = %self.name, id = %item.id, "filled fallback embedding");
            }
        }
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
        let filtered: Vec<MemoryItem> = self
            .items
            .iter()
            .filter(|entry| criteria.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();

        if let Some(ref probe) = criteria.similar_to {
            // Similarity ranking replaces recency ordering.
            let mut scored: Vec<(MemoryItem, f32)> = filtered
                .into_iter()
                .map(|item| {
                    let score = item
                        .embedding
                        .as_deref()
                        .map(|e| cosine_similarity(e, probe))
                        .unwrap_or(0.0);
                    (item, score)
                })
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            if let Some(limit) = criteria.limit {
                scored.truncate(limit);
            }
            return Ok(scored.into_iter().map(|(item, _)| item).collect());
        }

        Ok(order_and_limit(filtered, criteria))
    }

    async fn delete(&self, id: MemoryId) -> Result<bool, StoreError> {
        Ok(self.items.remove(&id).is_some())
    }
}

/// Deterministic fallback embedding: hash content bytes into `dimension`
/// buckets, then L2-normalize. Equal content always embeds identically.
pub fn embed_text(text: &str, dimension: usize) -> Vec<f32> {
    let mut buckets = vec![0.0f32; dimension.max(1)];
    for (i, byte) in text.bytes().enumerate() {
        // Knuth multiplicative hash spreads nearby positions apart.
        let slot = (byte as usize).wrapping_mul(2654435761).wrapping_add(i) % buckets.len();
        buckets[slot] += (byte as f32) / 255.0;
    }
    let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut buckets {
            *v /= norm;
        }
    }
    buckets
}

/// Cosine similarity of two vectors. Returns 0.0 for mismatched lengths or
/// zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_types::MemoryType;

    #[test]
    fn test_embed_text_deterministic_and_normalized() {
        let a = embed_text("the same content", 32);
        let b = embed_text("the same content", 32);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_store_fills_missing_embedding() {
        let store = VectorStore::with_dimension("vec-test", 16);
        let id = store
            .store(MemoryItem::new("needs an embedding", MemoryType::Semantic))
            .await
            .unwrap();
        let back = store.retrieve(id).await.unwrap();
        assert_eq!(back.embedding.as_ref().map(Vec::len), Some(16));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_schema_violation() {
        let store = VectorStore::with_dimension("vec-test", 16);
        let item =
            MemoryItem::new("wrong", MemoryType::Semantic).with_embedding(vec![0.1, 0.2, 0.3]);
        assert!(matches!(
            store.store(item).await,
            Err(StoreError::SchemaViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_nearest_ranks_identical_content_first() {
        let store = VectorStore::with_dimension("vec-test", 32);
        store
            .store(MemoryItem::new("rust async runtimes", MemoryType::Semantic))
            .await
            .unwrap();
        store
            .store(MemoryItem::new("gardening tips", MemoryType::Semantic))
            .await
            .unwrap();

        let probe = embed_text("rust async runtimes", 32);
        let ranked = store.nearest(&probe, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0.content, "rust async runtimes");
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[tokio::test]
    async fn test_query_with_similarity_ranking() {
        let store = VectorStore::with_dimension("vec-test", 32);
        store
            .store(MemoryItem::new("tokio select loops", MemoryType::Semantic))
            .await
            .unwrap();
        store
            .store(MemoryItem::new("sourdough starters", MemoryType::Semantic))
            .await
            .unwrap();

        let criteria = QueryCriteria {
            similar_to: Some(embed_text("tokio select loops", 32)),
            limit: Some(1),
            ..Default::default()
        };
        let hits = store.query(&criteria).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "tokio select loops");
    }
}
