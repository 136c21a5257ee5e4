//! A `Store` binds one adapter to its pending-update set and transaction
//! scope.
//!
//! Writes are serialized per store: at most one open transaction (or
//! auto-committed single write) mutates the pending-update set at a time.
//! Reads go straight to the adapter and never take the write gate.

use crate::adapter::{Delta, StoreAdapter};
use engram_types::{MemoryId, MemoryItem, QueryCriteria, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};

/// A keyed collection of memory items owned by exactly one backend, plus the
/// pending-update set of committed deltas not yet propagated to replicas.
pub struct Store {
    name: String,
    adapter: Arc<dyn StoreAdapter>,
    /// Committed-but-unpropagated deltas, in commit order. Appends happen at
    /// the tail under the write gate; sync drains from the head.
    pending: Mutex<Vec<Delta>>,
    /// Serializes transactions and auto-committed writes.
    write_gate: Arc<tokio::sync::Mutex<()>>,
}

impl Store {
    /// Wrap an adapter in a store with an empty pending-update set.
    pub fn new(name: impl Into<String>, adapter: Arc<dyn StoreAdapter>) -> Self {
        Self {
            name: name.into(),
            adapter,
            pending: Mutex::new(Vec::new()),
            write_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// The store's name for logs and sync reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying adapter. Replica synchronization applies deltas
    /// directly through this.
    pub fn adapter(&self) -> &Arc<dyn StoreAdapter> {
        &self.adapter
    }

    /// Store an item as a single-operation transaction: durable in the
    /// adapter, then recorded in the pending-update set.
    pub async fn store(&self, item: MemoryItem) -> Result<MemoryId, StoreError> {
        let _gate = self.write_gate.lock().await;
        let id = self.adapter.store(item.clone()).await?;
        self.append_pending(vec![Delta::Upsert(item)]);
        Ok(id)
    }

    /// Delete an item. Only an actual removal is recorded for propagation.
    pub async fn delete(&self, id: MemoryId) -> Result<bool, StoreError> {
        let _gate = self.write_gate.lock().await;
        let existed = self.adapter.delete(id).await?;
        if existed {
            self.append_pending(vec![Delta::Delete(id)]);
        }
        Ok(existed)
    }

    /// Fetch an item by id. Never blocks on writers.
    pub async fn retrieve(&self, id: MemoryId) -> Result<MemoryItem, StoreError> {
        self.adapter.retrieve(id).await
    }

    /// Query the adapter. Never blocks on writers.
    pub async fn query(&self, criteria: &QueryCriteria) -> Result<Vec<MemoryItem>, StoreError> {
        self.adapter.query(criteria).await
    }

    /// Merge a metadata patch into a committed item, bumping `updated_at`.
    /// The replaced row is recorded for propagation like any other write.
    pub async fn patch_metadata(
        &self,
        id: MemoryId,
        patch: HashMap<String, serde_json::Value>,
    ) -> Result<MemoryItem, StoreError> {
        let _gate = self.write_gate.lock().await;
        let mut item = self.adapter.retrieve(id).await?;
        item.patch_metadata(patch);
        self.adapter.store(item.clone()).await?;
        self.append_pending(vec![Delta::Upsert(item.clone())]);
        Ok(item)
    }

    /// Open a transaction. Holds the write gate until commit or rollback, so
    /// at most one transaction mutates this store at a time.
    pub async fn begin(&self) -> Transaction<'_> {
        let guard = self.write_gate.clone().lock_owned().await;
        Transaction {
            store: self,
            staged: Vec::new(),
            _gate: guard,
        }
    }

    /// Number of committed deltas awaiting propagation.
    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    /// Snapshot the pending-update set in commit order.
    pub fn pending_snapshot(&self) -> Vec<Delta> {
        self.lock_pending().clone()
    }

    /// Drop the first `n` pending deltas — the prefix a synchronize call has
    /// fully propagated. Concurrent commits only append, so the prefix is
    /// stable.
    pub fn confirm_propagated(&self, n: usize) {
        let mut pending = self.lock_pending();
        let n = n.min(pending.len());
        pending.drain(..n);
    }

    fn append_pending(&self, deltas: Vec<Delta>) {
        let mut pending = self.lock_pending();
        pending.extend(deltas);
        debug!(store = %self.name, pending = pending.len(), "recorded committed deltas");
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<Delta>> {
        // The pending mutex guards plain Vec ops that cannot panic; a
        // poisoned lock still holds consistent data.
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(store = %self.name, "pending set lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// A scoped unit of work against one store.
///
/// Staged writes live only in this buffer: other readers never observe them,
/// and the backend is untouched until [`commit`](Transaction::commit).
/// Dropping the transaction without committing is a rollback — staged writes
/// are discarded and the pending-update set is untouched, so nothing ever
/// propagates to replicas.
pub struct Transaction<'a> {
    store: &'a Store,
    staged: Vec<Delta>,
    _gate: OwnedMutexGuard<()>,
}

impl Transaction<'_> {
    /// Stage an item write. Returns the item's id.
    pub fn stage(&mut self, item: MemoryItem) -> MemoryId {
        let id = item.id;
        self.staged.push(Delta::Upsert(item));
        id
    }

    /// Stage a deletion.
    pub fn stage_delete(&mut self, id: MemoryId) {
        self.staged.push(Delta::Delete(id));
    }

    /// Number of staged writes.
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Apply staged writes to the adapter in order, then record them in the
    /// pending-update set.
    ///
    /// If the adapter fails mid-batch, the applied prefix is durable and is
    /// recorded for propagation; the rest is discarded with the error. The
    /// caller decides whether to re-stage.
    pub async fn commit(self) -> Result<(), StoreError> {
        let mut applied = Vec::with_capacity(self.staged.len());
        for delta in self.staged {
            let result = match &delta {
                Delta::Upsert(item) => self.store.adapter.store(item.clone()).await.map(|_| ()),
                Delta::Delete(id) => self.store.adapter.delete(*id).await.map(|_| ()),
            };
            match result {
                Ok(()) => applied.push(delta),
                Err(e) => {
                    warn!(
                        store = %self.store.name,
                        applied = applied.len(),
                        error = %e,
                        "commit failed mid-batch"
                    );
                    self.store.append_pending(applied);
                    return Err(e);
                }
            }
        }
        debug!(store = %self.store.name, count = applied.len(), "transaction committed");
        self.store.append_pending(applied);
        Ok(())
    }

    /// Discard staged writes. Equivalent to dropping the transaction;
    /// spelled out for callers that want the intent visible.
    pub fn rollback(self) {
        debug!(store = %self.store.name, discarded = self.staged.len(), "transaction rolled back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KeyValueStore;
    use engram_types::MemoryType;

    fn kv_store(name: &str) -> Store {
        Store::new(name, Arc::new(KeyValueStore::new(name)))
    }

    #[tokio::test]
    async fn test_store_appends_to_pending() {
        let store = kv_store("primary");
        let item = MemoryItem::new("tracked", MemoryType::Working);
        store.store(item).await.unwrap();
        assert_eq!(store.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_does_not_append() {
        let store = kv_store("primary");
        assert!(!store.delete(MemoryId::new()).await.unwrap());
        assert_eq!(store.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = kv_store("primary");
        let mut txn = store.begin().await;
        let id = txn.stage(MemoryItem::new("invisible", MemoryType::Working));
        // Not in the adapter, not in the pending set.
        assert!(matches!(
            store.adapter().retrieve(id).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.pending_len(), 0);
        txn.commit().await.unwrap();
        assert_eq!(store.retrieve(id).await.unwrap().content, "invisible");
        assert_eq!(store.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_leaves_no_trace() {
        let store = kv_store("primary");
        let mut txn = store.begin().await;
        let id = txn.stage(MemoryItem::new("discarded", MemoryType::Working));
        txn.stage_delete(MemoryId::new());
        txn.rollback();
        assert!(matches!(
            store.retrieve(id).await,
            Err(StoreError::NotFound(_))
        ));
        assert_eq!(store.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_is_a_rollback() {
        let store = kv_store("primary");
        {
            let mut txn = store.begin().await;
            txn.stage(MemoryItem::new("abandoned", MemoryType::Working));
            // Caller walks away: drop releases the write gate.
        }
        assert_eq!(store.pending_len(), 0);
        // Gate is free again.
        let mut txn = store.begin().await;
        txn.stage(MemoryItem::new("next", MemoryType::Working));
        txn.commit().await.unwrap();
        assert_eq!(store.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_propagated_drains_prefix() {
        let store = kv_store("primary");
        for i in 0..3 {
            store
                .store(MemoryItem::new(format!("item {i}"), MemoryType::Working))
                .await
                .unwrap();
        }
        store.confirm_propagated(2);
        assert_eq!(store.pending_len(), 1);
        // Over-confirming is clamped.
        store.confirm_propagated(10);
        assert_eq!(store.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_patch_metadata_round_trip() {
        let store = kv_store("primary");
        let item = MemoryItem::new("patchable", MemoryType::LongTerm);
        let id = store.store(item).await.unwrap();

        let mut patch = HashMap::new();
        patch.insert("reviewed".to_string(), serde_json::json!(true));
        let patched = store.patch_metadata(id, patch).await.unwrap();
        assert_eq!(patched.metadata.get("reviewed"), Some(&serde_json::json!(true)));
        assert_eq!(store.pending_len(), 2);

        let back = store.retrieve(id).await.unwrap();
        assert_eq!(back.metadata.get("reviewed"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn test_transactions_serialize_writes() {
        let store = Arc::new(kv_store("primary"));
        let txn = store.begin().await;
        let store2 = store.clone();
        let contender = tokio::spawn(async move {
            let mut txn2 = store2.begin().await;
            txn2.stage(MemoryItem::new("second", MemoryType::Working));
            txn2.commit().await.unwrap();
        });
        // The second transaction can't start until the first ends.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        txn.rollback();
        contender.await.unwrap();
        assert_eq!(store.pending_len(), 1);
    }
}
