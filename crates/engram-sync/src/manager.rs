//! The sync manager: ordered, last-write-wins delta propagation.

use dashmap::DashMap;
use engram_store::{Delta, Store};
use engram_types::{StoreError, SyncError};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one synchronize call against one replica.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    /// The replica that was synchronized.
    pub replica: String,
    /// Deltas applied (including conflict-resolved ones).
    pub applied: usize,
    /// Deltas where the replica's resident item was newer and won.
    pub conflicts_resolved: usize,
}

/// Cumulative counters across all synchronize calls.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    /// Completed synchronize calls.
    pub synchronizations: u64,
    /// Total deltas applied to replicas.
    pub deltas_applied: u64,
    /// Conflicts resolved by last-write-wins.
    pub conflicts_resolved: u64,
    /// Batches that failed partway through.
    pub partial_failures: u64,
}

/// Propagates committed deltas from a primary store to secondary replicas.
///
/// Calls draining the same primary are serialized: the snapshot, the
/// per-replica apply, and the drain happen under one per-primary lock, so
/// two concurrent calls can never drain deltas the other applied.
/// Independent primaries run concurrently. The pending-update set is
/// drained only for the prefix every targeted replica has accepted, so a
/// partial failure leaves the remaining batch for the next call.
pub struct SyncManager {
    primary_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    synchronizations: AtomicU64,
    deltas_applied: AtomicU64,
    conflicts_resolved: AtomicU64,
    partial_failures: AtomicU64,
}

impl SyncManager {
    /// Create a sync manager with zeroed counters.
    pub fn new() -> Self {
        Self {
            primary_locks: DashMap::new(),
            synchronizations: AtomicU64::new(0),
            deltas_applied: AtomicU64::new(0),
            conflicts_resolved: AtomicU64::new(0),
            partial_failures: AtomicU64::new(0),
        }
    }

    /// Propagate the primary's pending deltas to one replica, then drain the
    /// applied prefix. An empty pending set is a no-op.
    pub async fn synchronize(
        &self,
        primary: &Store,
        replica: &Store,
    ) -> Result<SyncReport, SyncError> {
        let _drain = self.lock_primary(primary).await;

        let batch = primary.pending_snapshot();
        if batch.is_empty() {
            return Ok(SyncReport {
                replica: replica.name().to_string(),
                applied: 0,
                conflicts_resolved: 0,
            });
        }

        let report = self.apply_batch(&batch, replica).await;
        match report {
            Ok(report) => {
                primary.confirm_propagated(report.applied);
                self.synchronizations.fetch_add(1, Ordering::Relaxed);
                debug!(
                    primary = primary.name(),
                    replica = replica.name(),
                    applied = report.applied,
                    conflicts = report.conflicts_resolved,
                    "synchronized"
                );
                Ok(report)
            }
            Err((applied, err)) => {
                // Keep the unapplied suffix for the next call.
                primary.confirm_propagated(applied);
                self.partial_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    primary = primary.name(),
                    replica = replica.name(),
                    applied,
                    total = batch.len(),
                    error = %err,
                    "partial propagation"
                );
                Err(SyncError::PartialPropagation {
                    replica: replica.name().to_string(),
                    applied,
                    total: batch.len(),
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Broadcast the primary's pending batch to every replica, draining only
    /// the prefix all of them accepted. Reports are returned per replica; the
    /// first failure is surfaced after every replica has been attempted.
    pub async fn synchronize_all(
        &self,
        primary: &Store,
        replicas: &[Store],
    ) -> Result<Vec<SyncReport>, SyncError> {
        // Snapshot, apply, and drain atomically with respect to other
        // drains of this primary. A snapshot taken outside the lock could
        // be drained twice, losing deltas committed between the calls.
        let _drain = self.lock_primary(primary).await;

        let batch = primary.pending_snapshot();
        if batch.is_empty() || replicas.is_empty() {
            return Ok(Vec::new());
        }

        let mut reports = Vec::with_capacity(replicas.len());
        let mut first_error: Option<SyncError> = None;
        let mut min_applied = batch.len();

        for replica in replicas {
            match self.apply_batch(&batch, replica).await {
                Ok(report) => {
                    min_applied = min_applied.min(report.applied);
                    reports.push(report);
                }
                Err((applied, err)) => {
                    min_applied = min_applied.min(applied);
                    self.partial_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        primary = primary.name(),
                        replica = replica.name(),
                        applied,
                        total = batch.len(),
                        error = %err,
                        "partial propagation during broadcast"
                    );
                    first_error.get_or_insert(SyncError::PartialPropagation {
                        replica: replica.name().to_string(),
                        applied,
                        total: batch.len(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        // Only deltas every replica has seen leave the pending set. Replicas
        // ahead of the drained prefix will see those deltas again on retry;
        // keyed overwrites make that harmless.
        primary.confirm_propagated(min_applied);

        match first_error {
            Some(err) => Err(err),
            None => {
                self.synchronizations.fetch_add(1, Ordering::Relaxed);
                Ok(reports)
            }
        }
    }

    /// Apply a batch in recorded order. Returns the successful report, or
    /// the applied count paired with the adapter error that stopped it.
    async fn apply_batch(
        &self,
        batch: &[Delta],
        replica: &Store,
    ) -> Result<SyncReport, (usize, StoreError)> {
        let mut applied = 0;
        let mut conflicts_resolved = 0;
        for delta in batch {
            let result = match delta {
                Delta::Upsert(item) => replica.adapter().store(item.clone()).await.map(|_| ()),
                Delta::Delete(id) => replica.adapter().delete(*id).await.map(|_| ()),
            };
            match result {
                Ok(()) => applied += 1,
                // The replica's resident item was newer: last-write-wins
                // keeps it, and the delta counts as propagated.
                Err(StoreError::Conflict { id, .. }) => {
                    debug!(replica = replica.name(), id = %id, "replica kept newer item");
                    applied += 1;
                    conflicts_resolved += 1;
                    self.conflicts_resolved.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => return Err((applied, err)),
            }
            self.deltas_applied.fetch_add(1, Ordering::Relaxed);
        }
        Ok(SyncReport {
            replica: replica.name().to_string(),
            applied,
            conflicts_resolved,
        })
    }

    async fn lock_primary(&self, primary: &Store) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = self
            .primary_locks
            .entry(primary.name().to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Snapshot the cumulative counters.
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            synchronizations: self.synchronizations.load(Ordering::Relaxed),
            deltas_applied: self.deltas_applied.load(Ordering::Relaxed),
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Relaxed),
            partial_failures: self.partial_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for SyncManager {
    fn default() -> Self {
        Self::new()
    }
}
