//! Transaction coordinator for managing transaction lifecycle
//!
//! The TransactionCoordinator wraps TransactionManager and adds:
//! - Active transaction tracking
//! - Transaction metrics (started, committed, aborted)
//! - Commit/abort logging under the `tally::txn` target
//!
//! Every transaction is handed out inside an [`ActiveTransaction`] guard.
//! The guard records the outcome when it is dropped, so a transaction that
//! is abandoned without a commit still counts as aborted and never keeps
//! the active count up.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tally_concurrency::{TransactionContext, TransactionManager};
use tally_core::{TallyError, TallyResult, Version};
use tally_durability::CommitLog;
use tally_storage::MemoryStore;
use tracing::{debug, warn};

use crate::replay::RecoveryStats;

/// Transaction coordinator for the database
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering: they are observational only
/// and synchronize nothing else.
#[derive(Debug)]
pub struct TransactionCoordinator {
    manager: TransactionManager,
    active_count: AtomicU64,
    total_started: AtomicU64,
    total_committed: AtomicU64,
    total_aborted: AtomicU64,
}

impl TransactionCoordinator {
    /// Create a coordinator starting after `initial_version`
    pub fn new(initial_version: Version) -> Self {
        Self::with_manager(TransactionManager::new(initial_version))
    }

    /// Create a coordinator that continues where a replayed log ended
    ///
    /// Both the version and the transaction id resume after the log, so new
    /// commits never reuse either.
    pub fn from_recovery(stats: &RecoveryStats) -> Self {
        Self::with_manager(TransactionManager::with_txn_id(
            stats.final_version,
            stats.max_txn_id,
        ))
    }

    fn with_manager(manager: TransactionManager) -> Self {
        Self {
            manager,
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
        }
    }

    /// Start a new transaction over a snapshot of `storage`
    pub fn start_transaction(&self, storage: &MemoryStore) -> ActiveTransaction<'_> {
        let txn_id = self.manager.next_txn_id();
        let snapshot = storage.create_snapshot();
        self.record_start();

        debug!(
            target: "tally::txn",
            txn_id,
            start_version = snapshot_version(&snapshot),
            "Transaction started"
        );

        ActiveTransaction {
            ctx: TransactionContext::with_snapshot(txn_id, Box::new(snapshot)),
            coordinator: self,
        }
    }

    /// Commit a transaction through the concurrency layer
    ///
    /// Converts `CommitError` into `TallyError`. The outcome is counted when
    /// the owning [`ActiveTransaction`] drops.
    ///
    /// # Errors
    ///
    /// `TransactionConflict` on a read-set conflict, the log's error if the
    /// append failed, `TransactionNotActive` for a finished transaction.
    pub fn commit(
        &self,
        txn: &mut TransactionContext,
        store: &MemoryStore,
        log: Option<&Mutex<CommitLog>>,
    ) -> TallyResult<Version> {
        match self.manager.commit(txn, store, log) {
            Ok(version) => {
                debug!(
                    target: "tally::txn",
                    txn_id = txn.txn_id,
                    commit_version = version.as_u64(),
                    writes = txn.write_count(),
                    "Transaction committed"
                );
                Ok(version)
            }
            Err(e) => {
                let err = TallyError::from(e);
                if err.is_conflict() {
                    debug!(
                        target: "tally::txn",
                        txn_id = txn.txn_id,
                        error = %err,
                        "Transaction conflicted"
                    );
                } else {
                    warn!(
                        target: "tally::txn",
                        txn_id = txn.txn_id,
                        error = %err,
                        "Transaction aborted"
                    );
                }
                Err(err)
            }
        }
    }

    fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
    }

    fn record_commit(&self) {
        self.decrement_active();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_abort(&self) {
        self.decrement_active();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement_active(&self) {
        // The closure never returns None, so the update cannot fail
        self.active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            })
            .ok();
    }

    /// Last published commit version
    pub fn current_version(&self) -> Version {
        self.manager.current_version()
    }

    /// Allocate a transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.manager.next_txn_id()
    }

    /// Snapshot of transaction statistics
    pub fn metrics(&self) -> TransactionMetrics {
        let started = self.total_started.load(Ordering::Relaxed);
        let committed = self.total_committed.load(Ordering::Relaxed);

        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: started,
            total_committed: committed,
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
            commit_rate: if started > 0 {
                committed as f64 / started as f64
            } else {
                0.0
            },
        }
    }

    /// Current active transaction count
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until no transaction is active, or `timeout` passes
    ///
    /// Returns `false` on timeout.
    pub fn wait_for_idle(&self, timeout: std::time::Duration) -> bool {
        let start = std::time::Instant::now();
        while self.active_count.load(Ordering::SeqCst) > 0 {
            if start.elapsed() > timeout {
                return false;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        true
    }
}

/// A transaction checked out from a [`TransactionCoordinator`]
///
/// Dereferences to the [`TransactionContext`] it owns. Dropping the guard
/// records the outcome exactly once: committed if the context committed,
/// aborted otherwise. A context still active at that point is marked
/// aborted and its buffered writes are discarded.
pub struct ActiveTransaction<'a> {
    ctx: TransactionContext,
    coordinator: &'a TransactionCoordinator,
}

impl Deref for ActiveTransaction<'_> {
    type Target = TransactionContext;

    fn deref(&self) -> &TransactionContext {
        &self.ctx
    }
}

impl DerefMut for ActiveTransaction<'_> {
    fn deref_mut(&mut self) -> &mut TransactionContext {
        &mut self.ctx
    }
}

impl Drop for ActiveTransaction<'_> {
    fn drop(&mut self) {
        if self.ctx.is_committed() {
            self.coordinator.record_commit();
            return;
        }

        if self.ctx.mark_aborted("dropped before commit").is_ok() {
            debug!(
                target: "tally::txn",
                txn_id = self.ctx.txn_id,
                "Transaction dropped before commit"
            );
        }
        self.coordinator.record_abort();
    }
}

fn snapshot_version(snapshot: &tally_storage::ClonedSnapshotView) -> u64 {
    use tally_core::SnapshotView;
    snapshot.version().as_u64()
}

/// Transaction metrics
#[derive(Debug, Clone)]
pub struct TransactionMetrics {
    /// Number of currently active transactions
    pub active_count: u64,
    /// Total number of transactions started
    pub total_started: u64,
    /// Total number of transactions committed
    pub total_committed: u64,
    /// Total number of transactions aborted
    pub total_aborted: u64,
    /// Commit success rate (committed / started)
    pub commit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{DocumentPath, Value};

    fn path() -> DocumentPath {
        DocumentPath::new("counters", "20250513").unwrap()
    }

    #[test]
    fn test_coordinator_new() {
        let coordinator = TransactionCoordinator::new(Version::ZERO);
        assert_eq!(coordinator.current_version(), Version::ZERO);

        let metrics = coordinator.metrics();
        assert_eq!(metrics.active_count, 0);
        assert_eq!(metrics.total_started, 0);
        assert_eq!(metrics.commit_rate, 0.0);
    }

    #[test]
    fn test_from_recovery_resumes_ids_and_versions() {
        let stats = RecoveryStats {
            txns_replayed: 5,
            final_version: Version::new(100),
            max_txn_id: 6,
            ..RecoveryStats::default()
        };
        let coordinator = TransactionCoordinator::from_recovery(&stats);
        assert_eq!(coordinator.current_version(), Version::new(100));
        assert_eq!(coordinator.next_txn_id(), 7);
    }

    #[test]
    fn test_commit_updates_metrics() {
        let coordinator = TransactionCoordinator::new(Version::ZERO);
        let store = MemoryStore::new();

        let mut txn = coordinator.start_transaction(&store);
        assert_eq!(coordinator.metrics().active_count, 1);
        txn.put(path(), Value::object().with_field("count", 1i64)).unwrap();

        let version = coordinator.commit(&mut txn, &store, None).unwrap();
        assert_eq!(version, Version::new(1));
        assert_eq!(coordinator.metrics().active_count, 1);
        drop(txn);

        let metrics = coordinator.metrics();
        assert_eq!(metrics.total_started, 1);
        assert_eq!(metrics.total_committed, 1);
        assert_eq!(metrics.active_count, 0);
        assert_eq!(metrics.commit_rate, 1.0);
    }

    #[test]
    fn test_conflict_counts_as_abort() {
        let coordinator = TransactionCoordinator::new(Version::ZERO);
        let store = MemoryStore::new();

        let mut t1 = coordinator.start_transaction(&store);
        let mut t2 = coordinator.start_transaction(&store);
        for txn in [&mut t1, &mut t2] {
            txn.get(&path()).unwrap();
            txn.put(path(), Value::object().with_field("count", 1i64)).unwrap();
        }

        coordinator.commit(&mut t1, &store, None).unwrap();
        let err = coordinator.commit(&mut t2, &store, None).unwrap_err();
        assert!(err.is_conflict());
        drop((t1, t2));

        let metrics = coordinator.metrics();
        assert_eq!(metrics.total_committed, 1);
        assert_eq!(metrics.total_aborted, 1);
        assert_eq!(metrics.active_count, 0);
        assert_eq!(metrics.commit_rate, 0.5);
    }

    #[test]
    fn test_dropped_transaction_counts_as_abort() {
        let coordinator = TransactionCoordinator::new(Version::ZERO);
        let store = MemoryStore::new();

        {
            let mut txn = coordinator.start_transaction(&store);
            txn.put(path(), Value::object().with_field("count", 1i64)).unwrap();
            assert_eq!(coordinator.active_count(), 1);
        }

        let metrics = coordinator.metrics();
        assert_eq!(metrics.active_count, 0);
        assert_eq!(metrics.total_aborted, 1);
        assert_eq!(metrics.total_committed, 0);
        assert_eq!(coordinator.current_version(), Version::ZERO);
        assert!(coordinator.wait_for_idle(std::time::Duration::from_millis(10)));
    }

    #[test]
    fn test_active_count_saturates_at_zero() {
        let coordinator = TransactionCoordinator::new(Version::ZERO);
        coordinator.record_abort();
        assert_eq!(coordinator.active_count(), 0);
    }

    #[test]
    fn test_wait_for_idle() {
        let coordinator = TransactionCoordinator::new(Version::ZERO);
        assert!(coordinator.wait_for_idle(std::time::Duration::from_millis(10)));

        coordinator.record_start();
        assert!(!coordinator.wait_for_idle(std::time::Duration::from_millis(10)));
        coordinator.record_commit();
        assert!(coordinator.wait_for_idle(std::time::Duration::from_millis(10)));
    }
}
