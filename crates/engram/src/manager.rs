//! The memory manager façade.
//!
//! The only entry point the rest of the platform uses. Each verb maps to:
//! cache check → store adapter call (resilience-wrapped when the backend is
//! remote) → cache population → sync notification for mutations.

use crate::config::{BackendConfig, EngramConfig};
use engram_cache::{CacheStats, TieredCache};
use engram_resilience::{BreakerSnapshot, Resilience, ResilienceError};
use engram_store::{
    DocumentStore, GraphStore, KeyValueStore, Store, Transaction, VectorStore,
};
use engram_sync::{SyncManager, SyncReport, SyncStats};
use engram_types::{
    MemoryError, MemoryId, MemoryItem, MemoryResult, QueryCriteria, StoreError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Snapshot export/import encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// JSON text.
    Json,
    /// MessagePack binary.
    MessagePack,
}

/// Report from a snapshot import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Items written to the primary.
    pub imported: u64,
    /// Per-item failures, as messages. An import never aborts mid-batch.
    pub errors: Vec<String>,
}

/// Observability snapshot across the whole subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    /// Cache hit counters, per layer.
    pub cache: CacheStats,
    /// Replica propagation counters.
    pub sync: SyncStats,
    /// Breaker state, when the backend is remote.
    pub breaker: Option<BreakerSnapshot>,
    /// Committed deltas awaiting propagation.
    pub pending_deltas: usize,
}

/// The memory manager: tiered cache, resilient adapter access, and replica
/// propagation behind four verbs.
pub struct MemoryManager {
    primary: Store,
    secondaries: Vec<Store>,
    cache: TieredCache,
    sync: SyncManager,
    resilience: Option<Resilience>,
}

impl MemoryManager {
    /// Compose a manager from explicit stores.
    pub fn new(config: &EngramConfig, primary: Store, secondaries: Vec<Store>) -> Self {
        let resilience = config.remote_backend.then(|| {
            Resilience::new(
                primary.name().to_string(),
                config.retry.clone(),
                config.breaker.clone(),
            )
        });
        Self {
            primary,
            secondaries,
            cache: TieredCache::new(&config.cache),
            sync: SyncManager::new(),
            resilience,
        }
    }

    /// Build stores from the configured topology and compose a manager.
    pub fn from_config(config: &EngramConfig) -> MemoryResult<Self> {
        let primary = build_store("primary", &config.primary)?;
        let secondaries = config
            .replication
            .secondaries
            .iter()
            .enumerate()
            .map(|(i, backend)| build_store(&format!("replica-{i}"), backend))
            .collect::<MemoryResult<Vec<_>>>()?;
        Ok(Self::new(config, primary, secondaries))
    }

    /// The primary store. Exposed for transaction-scoped work.
    pub fn primary(&self) -> &Store {
        &self.primary
    }

    /// Open a transaction against the primary store. Dropping it without
    /// committing is a rollback; nothing is staged for replicas.
    pub async fn begin(&self) -> Transaction<'_> {
        self.primary.begin().await
    }

    /// Store an item: durable on the primary, cached, then propagated.
    ///
    /// A sync failure surfaces to the caller, but the primary write stands
    /// and the unpropagated deltas stay pending for the next synchronize.
    pub async fn store(&self, item: MemoryItem) -> MemoryResult<MemoryId> {
        let id = match &self.resilience {
            Some(r) => {
                let primary = &self.primary;
                let payload = item.clone();
                r.call(
                    move || {
                        let payload = payload.clone();
                        async move { primary.store(payload).await }
                    },
                    StoreError::is_retryable,
                )
                .await
                .map_err(from_resilience)?
            }
            None => self.primary.store(item.clone()).await?,
        };
        self.cache.put(id, item);
        self.notify_sync().await?;
        Ok(id)
    }

    /// Retrieve an item, from cache when possible.
    ///
    /// On a cache miss against an open breaker this returns
    /// [`MemoryError::CircuitOpen`] — a recoverable signal; the cache was
    /// already consulted, so there is no better degraded answer to give.
    pub async fn retrieve(&self, id: MemoryId) -> MemoryResult<MemoryItem> {
        if let Some(item) = self.cache.get(&id) {
            debug!(id = %id, "served from cache");
            return Ok(item);
        }
        let item = match &self.resilience {
            Some(r) => {
                let primary = &self.primary;
                r.call(
                    move || async move { primary.retrieve(id).await },
                    StoreError::is_retryable,
                )
                .await
                .map_err(from_resilience)?
            }
            None => self.primary.retrieve(id).await?,
        };
        self.cache.put(id, item.clone());
        Ok(item)
    }

    /// Query the primary. Results are not cached: criteria hits are not
    /// key-addressable, so they can't honor later invalidations.
    pub async fn query(&self, criteria: &QueryCriteria) -> MemoryResult<Vec<MemoryItem>> {
        match &self.resilience {
            Some(r) => {
                let primary = &self.primary;
                r.call(
                    move || async move { primary.query(criteria).await },
                    StoreError::is_retryable,
                )
                .await
                .map_err(from_resilience)
            }
            None => self.primary.query(criteria).await.map_err(Into::into),
        }
    }

    /// Delete an item everywhere: primary, cache, then replicas.
    pub async fn delete(&self, id: MemoryId) -> MemoryResult<bool> {
        let existed = match &self.resilience {
            Some(r) => {
                let primary = &self.primary;
                r.call(
                    move || async move { primary.delete(id).await },
                    StoreError::is_retryable,
                )
                .await
                .map_err(from_resilience)?
            }
            None => self.primary.delete(id).await?,
        };
        self.cache.invalidate(&id);
        if existed {
            self.notify_sync().await?;
        }
        Ok(existed)
    }

    /// Merge a metadata patch into a committed item.
    pub async fn patch_metadata(
        &self,
        id: MemoryId,
        patch: HashMap<String, serde_json::Value>,
    ) -> MemoryResult<MemoryItem> {
        let item = match &self.resilience {
            Some(r) => {
                let primary = &self.primary;
                let patch_ref = &patch;
                r.call(
                    move || {
                        let patch = patch_ref.clone();
                        async move { primary.patch_metadata(id, patch).await }
                    },
                    StoreError::is_retryable,
                )
                .await
                .map_err(from_resilience)?
            }
            None => self.primary.patch_metadata(id, patch).await?,
        };
        self.cache.put(id, item.clone());
        self.notify_sync().await?;
        Ok(item)
    }

    /// Propagate pending deltas to every configured replica.
    pub async fn synchronize(&self) -> MemoryResult<Vec<SyncReport>> {
        self.sync
            .synchronize_all(&self.primary, &self.secondaries)
            .await
            .map_err(Into::into)
    }

    /// Serialize every item in the primary as a snapshot.
    pub async fn export(&self, format: ExportFormat) -> MemoryResult<Vec<u8>> {
        let items = self.query(&QueryCriteria::default()).await?;
        match format {
            ExportFormat::Json => serde_json::to_vec(&items)
                .map_err(|e| MemoryError::Serialization(e.to_string())),
            ExportFormat::MessagePack => rmp_serde::to_vec_named(&items)
                .map_err(|e| MemoryError::Serialization(e.to_string())),
        }
    }

    /// Write a snapshot into the primary. Individual item failures are
    /// collected, not fatal; imported items propagate like any other write.
    pub async fn import(&self, data: &[u8], format: ExportFormat) -> MemoryResult<ImportReport> {
        let items: Vec<MemoryItem> = match format {
            ExportFormat::Json => serde_json::from_slice(data)
                .map_err(|e| MemoryError::Serialization(e.to_string()))?,
            ExportFormat::MessagePack => rmp_serde::from_slice(data)
                .map_err(|e| MemoryError::Serialization(e.to_string()))?,
        };
        let mut report = ImportReport::default();
        for item in items {
            let id = item.id;
            match self.primary.store(item).await {
                Ok(_) => report.imported += 1,
                Err(e) => {
                    warn!(id = %id, error = %e, "import skipped item");
                    report.errors.push(format!("{id}: {e}"));
                }
            }
        }
        self.notify_sync().await?;
        Ok(report)
    }

    /// Snapshot cache, sync, breaker and pending-set state.
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            cache: self.cache.stats(),
            sync: self.sync.stats(),
            breaker: self.resilience.as_ref().map(|r| r.breaker().snapshot()),
            pending_deltas: self.primary.pending_len(),
        }
    }

    async fn notify_sync(&self) -> MemoryResult<()> {
        if self.secondaries.is_empty() {
            return Ok(());
        }
        self.sync
            .synchronize_all(&self.primary, &self.secondaries)
            .await?;
        Ok(())
    }
}

/// Build a store for a configured backend.
fn build_store(name: &str, backend: &BackendConfig) -> MemoryResult<Store> {
    let adapter: Arc<dyn engram_store::StoreAdapter> = match backend {
        BackendConfig::Document { path: Some(path) } => {
            Arc::new(DocumentStore::open(name, path)?)
        }
        BackendConfig::Document { path: None } => Arc::new(DocumentStore::open_in_memory(name)?),
        BackendConfig::KeyValue => Arc::new(KeyValueStore::new(name)),
        BackendConfig::Vector { dimension } => {
            Arc::new(VectorStore::with_dimension(name, *dimension))
        }
        BackendConfig::Graph => Arc::new(GraphStore::new(name)),
    };
    Ok(Store::new(name, adapter))
}

fn from_resilience(err: ResilienceError<StoreError>) -> MemoryError {
    match err {
        ResilienceError::CircuitOpen {
            endpoint,
            retry_after_ms,
        } => MemoryError::CircuitOpen {
            endpoint,
            retry_after_ms,
        },
        ResilienceError::Inner(e) => MemoryError::Store(e),
    }
}
