//! Configuration loading with documented defaults.
//!
//! The whole subsystem is configured once, at construction, from a single
//! [`EngramConfig`]. Nothing environment-specific is embedded below the
//! façade; a missing or unparseable file falls back to defaults with a
//! warning rather than failing the boot.

use engram_cache::CacheConfig;
use engram_resilience::{BreakerConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which physical backend a store uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// SQLite document store. `path = None` keeps it in memory.
    Document {
        /// Database file location; omit for in-memory.
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// In-process key-value store.
    KeyValue,
    /// Embedding-indexed vector store.
    Vector {
        /// Embedding dimension.
        #[serde(default = "default_dimension")]
        dimension: usize,
    },
    /// Graph store with `related_to` adjacency.
    Graph,
}

fn default_dimension() -> usize {
    engram_store::vector::DEFAULT_DIMENSION
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Document { path: None }
    }
}

/// Primary→secondaries replica topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Secondary replicas the primary's committed deltas propagate to.
    /// Default: none.
    #[serde(default)]
    pub secondaries: Vec<BackendConfig>,
}

/// Top-level configuration for the memory layer.
///
/// Defaults: in-memory document primary, no replicas, cache layers of
/// 128 and 1024 entries, 2 retries starting at 50ms, breaker threshold 3
/// with a 30s cool-down, local (unwrapped) backend calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngramConfig {
    /// Primary backend.
    pub primary: BackendConfig,
    /// Replica topology.
    pub replication: ReplicationConfig,
    /// Cache layer count and per-layer capacities.
    pub cache: CacheConfig,
    /// Retry count and backoff base for remote calls.
    pub retry: RetryConfig,
    /// Circuit-breaker threshold and cool-down.
    pub breaker: BreakerConfig,
    /// Whether backend calls cross a network and need the resilience
    /// wrapper. Default: false.
    pub remote_backend: bool,
}

/// Load configuration from a TOML file, with defaults.
///
/// `None`, a missing file, or a file that fails to parse all yield
/// `EngramConfig::default()`; parse failures are logged, never fatal.
pub fn load_config(path: Option<&Path>) -> EngramConfig {
    let Some(path) = path else {
        return EngramConfig::default();
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<EngramConfig>(&contents) {
            Ok(config) => {
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "Failed to parse config, using defaults"
                );
                EngramConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %path.display(),
                "Failed to read config file, using defaults"
            );
            EngramConfig::default()
        }
    }
}
