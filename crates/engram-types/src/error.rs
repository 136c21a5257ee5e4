//! Error taxonomy for the Engram memory layer.

use crate::item::MemoryId;
use thiserror::Error;

/// Failure from a single store adapter call.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No item with the given id exists.
    #[error("item not found: {0}")]
    NotFound(MemoryId),

    /// A stale write was rejected: the resident item is newer.
    #[error("write conflict on {id}: {reason}")]
    Conflict {
        /// The contested item id.
        id: MemoryId,
        /// Why the write was rejected.
        reason: String,
    },

    /// The backend failed at the I/O or connection level.
    #[error("I/O failure: {0}")]
    Io(String),

    /// The payload does not fit the backend's schema (bad dimension,
    /// unparseable row, serialization failure).
    #[error("schema violation: {0}")]
    SchemaViolation(String),
}

impl StoreError {
    /// Whether a retry could plausibly succeed.
    ///
    /// I/O failures are transient; `Conflict` and `SchemaViolation` indicate
    /// a logic error and must propagate immediately. `NotFound` is a
    /// definitive answer, not a fault.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }
}

/// Failure from replica synchronization.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A secondary rejected a delta mid-batch. The unapplied suffix of the
    /// pending-update set is retained; the next synchronize call retries it.
    #[error("partial propagation to '{replica}': {applied}/{total} deltas applied: {reason}")]
    PartialPropagation {
        /// Name of the replica that rejected the delta.
        replica: String,
        /// How many deltas landed before the failure.
        applied: usize,
        /// Size of the attempted batch.
        total: usize,
        /// The underlying adapter failure.
        reason: String,
    },
}

/// Top-level error surfaced by the memory manager façade.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// A store adapter call failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Replica synchronization failed.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// The call was short-circuited by an open circuit breaker. Recoverable:
    /// callers should fall back to a cached value or skip the operation.
    #[error("circuit open for '{endpoint}', retry after {retry_after_ms}ms")]
    CircuitOpen {
        /// The logical endpoint whose breaker is open.
        endpoint: String,
        /// How long until the breaker will allow a probe.
        retry_after_ms: u64,
    },

    /// Encoding or decoding of a snapshot failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Alias for Result with MemoryError.
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Io("connection reset".into()).is_retryable());
        assert!(!StoreError::NotFound(MemoryId::new()).is_retryable());
        assert!(!StoreError::SchemaViolation("bad dimension".into()).is_retryable());
        assert!(!StoreError::Conflict {
            id: MemoryId::new(),
            reason: "resident item is newer".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_store_error_converts_to_memory_error() {
        let err: MemoryError = StoreError::Io("disk full".into()).into();
        assert!(matches!(err, MemoryError::Store(StoreError::Io(_))));
    }

    #[test]
    fn test_partial_propagation_message() {
        let err = SyncError::PartialPropagation {
            replica: "vector-replica".into(),
            applied: 2,
            total: 5,
            reason: "I/O failure: closed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("vector-replica"));
        assert!(msg.contains("2/5"));
    }
}
