//! Engram: the memory subsystem for agent runtimes.
//!
//! A [`MemoryManager`] fronts one primary store (document, key-value,
//! vector, or graph backed) and any number of replicas. Reads go through a
//! tiered LRU cache; writes land on the primary, populate the cache, and
//! propagate to replicas through committed-delta synchronization. Remote
//! backends are wrapped in retry-with-backoff and a circuit breaker, and a
//! warm cache keeps reads serving while a breaker is open.
//!
//! ```no_run
//! use engram::{load_config, MemoryManager};
//! use engram_types::{MemoryItem, MemoryType};
//!
//! # async fn demo() -> engram_types::MemoryResult<()> {
//! let config = load_config(None);
//! let manager = MemoryManager::from_config(&config)?;
//! let id = manager
//!     .store(MemoryItem::new("the sky is blue", MemoryType::Semantic))
//!     .await?;
//! let item = manager.retrieve(id).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod manager;

pub use config::{load_config, BackendConfig, EngramConfig, ReplicationConfig};
pub use manager::{ExportFormat, ImportReport, ManagerStats, MemoryManager};

pub use engram_cache::{CacheConfig, CacheStats, TieredCache};
pub use engram_resilience::{BreakerConfig, BreakerSnapshot, Resilience, RetryConfig};
pub use engram_store::{Delta, Store, StoreAdapter, Transaction};
pub use engram_sync::{SyncManager, SyncReport, SyncStats};
pub use engram_types::{
    MemoryError, MemoryId, MemoryItem, MemoryResult, MemoryType, QueryCriteria, StoreError,
    SyncError,
};
