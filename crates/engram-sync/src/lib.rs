//! Replica synchronization.
//!
//! Propagates a primary store's committed deltas to secondary replicas.
//! Rollbacks never write to the pending-update set, so they can never leak
//! to a replica. Deltas are keyed overwrites, so retrying a partially
//! propagated batch is idempotent.

mod manager;

pub use manager::{SyncManager, SyncReport, SyncStats};
