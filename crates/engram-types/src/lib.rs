//! Shared types for the Engram memory layer.
//!
//! Defines the logical shape every storage backend must faithfully
//! (de)serialize — [`item::MemoryItem`] — plus the query criteria accepted
//! by all backends and the error taxonomy surfaced to callers.

pub mod error;
pub mod item;
pub mod query;

pub use error::{MemoryError, MemoryResult, StoreError, SyncError};
pub use item::{MemoryId, MemoryItem, MemoryType};
pub use query::QueryCriteria;
