//! Transaction manager for coordinating commit operations
//!
//! Provides atomic commit by orchestrating:
//! 1. Validation (first-committer-wins)
//! 2. Commit log append (durability)
//! 3. Storage application (visibility)
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. Take the commit lock
//! 2. txn.commit() - validate read set, Active → Validating → Committed
//! 3. IF conflicts: transaction is Aborted, return error
//! 4. Pick commit_version = current + 1
//! 5. Append CommitRecord to the log (DURABILITY POINT)
//! 6. Publish commit_version and apply writes to storage
//! 7. Return Ok(commit_version)
//! ```
//!
//! If the append fails, the version is not published and nothing is applied.
//! If the process dies after step 5, replay applies the record on next open.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tally_core::{Storage, TallyResult, Timestamp, Version};
use tally_durability::{CommitLog, CommitRecord};
use tracing::error;

use crate::{CommitError, TransactionContext, TransactionStatus};

/// Manages transaction identity and atomic commits
///
/// The commit lock serializes validate-then-apply, so no transaction can
/// slip a write in between another's validation and its application.
/// Reads never take it.
#[derive(Debug)]
pub struct TransactionManager {
    /// Last published commit version
    version: AtomicU64,

    /// Next transaction ID
    next_txn_id: AtomicU64,

    commit_lock: Mutex<()>,
}

impl TransactionManager {
    /// Create a manager whose next commit gets `initial_version + 1`
    pub fn new(initial_version: Version) -> Self {
        Self::with_txn_id(initial_version, 0)
    }

    /// Create a manager resuming after recovery
    ///
    /// New transactions get ids above `max_txn_id` so they never collide
    /// with ids already in the commit log.
    pub fn with_txn_id(initial_version: Version, max_txn_id: u64) -> Self {
        TransactionManager {
            version: AtomicU64::new(initial_version.as_u64()),
            next_txn_id: AtomicU64::new(max_txn_id + 1),
            commit_lock: Mutex::new(()),
        }
    }

    /// Last published commit version
    pub fn current_version(&self) -> Version {
        Version::new(self.version.load(Ordering::SeqCst))
    }

    /// Allocate the next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Commit a transaction atomically
    ///
    /// Read-only transactions are validated but write nothing and return
    /// the current version.
    ///
    /// # Errors
    ///
    /// - `CommitError::ValidationFailed` if a read document changed
    /// - `CommitError::Log` if the commit log refused the record
    /// - `CommitError::Storage` if validation could not read storage, or if
    ///   an unlogged store failed to apply the batch
    /// - `CommitError::InvalidState` if the transaction is not active
    pub fn commit<S: Storage + ?Sized>(
        &self,
        txn: &mut TransactionContext,
        store: &S,
        log: Option<&Mutex<CommitLog>>,
    ) -> Result<Version, CommitError> {
        let _guard = self.commit_lock.lock();

        txn.commit(store)?;

        if txn.is_read_only() {
            return Ok(self.current_version());
        }

        let commit_version = self.current_version().next();
        let timestamp = Timestamp::now();
        let writes = txn.writes();
        let deletes = txn.deletes();

        if let Some(log) = log {
            let record = CommitRecord {
                txn_id: txn.txn_id,
                version: commit_version,
                timestamp,
                writes: writes.clone(),
                deletes: deletes.clone(),
            };
            if let Err(e) = log.lock().append(&record) {
                txn.status = TransactionStatus::Aborted {
                    reason: format!("commit log append failed: {}", e),
                };
                return Err(CommitError::Log(e));
            }
        }

        self.version.store(commit_version.as_u64(), Ordering::SeqCst);

        if let Err(e) = store.apply_batch(&writes, &deletes, commit_version, timestamp) {
            if log.is_none() {
                txn.status = TransactionStatus::Aborted {
                    reason: format!("storage apply failed: {}", e),
                };
                return Err(CommitError::Storage(e));
            }
            // The log is authoritative; replay will apply it on restart
            error!(
                target: "tally::txn",
                txn_id = txn.txn_id,
                commit_version = commit_version.as_u64(),
                error = %e,
                "Storage application failed after commit log append"
            );
        }

        Ok(commit_version)
    }

    /// Explicitly abort a transaction
    ///
    /// Nothing is written to the log for aborted transactions.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if the transaction already finished.
    pub fn abort(
        &self,
        txn: &mut TransactionContext,
        reason: impl Into<String>,
    ) -> TallyResult<()> {
        txn.mark_aborted(reason)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new(Version::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{DocumentPath, SnapshotView, Value};
    use tally_durability::DurabilityMode;
    use tally_storage::MemoryStore;
    use tempfile::TempDir;

    fn path(id: &str) -> DocumentPath {
        DocumentPath::new("counters", id).unwrap()
    }

    fn counter(count: i64) -> Value {
        Value::object().with_field("count", count)
    }

    fn begin(store: &MemoryStore, manager: &TransactionManager) -> TransactionContext {
        TransactionContext::with_snapshot(manager.next_txn_id(), Box::new(store.create_snapshot()))
    }

    #[test]
    fn test_new_manager() {
        let manager = TransactionManager::new(Version::new(100));
        assert_eq!(manager.current_version(), Version::new(100));
        assert_eq!(TransactionManager::default().current_version(), Version::ZERO);
    }

    #[test]
    fn test_next_txn_id_resumes_after_recovery() {
        let manager = TransactionManager::with_txn_id(Version::new(5), 41);
        assert_eq!(manager.next_txn_id(), 42);
        assert_eq!(manager.next_txn_id(), 43);
    }

    #[test]
    fn test_commit_applies_with_one_version() {
        let store = MemoryStore::new();
        let manager = TransactionManager::default();

        let mut txn = begin(&store, &manager);
        txn.put(path("a"), counter(1)).unwrap();
        txn.put(path("b"), counter(2)).unwrap();

        let version = manager.commit(&mut txn, &store, None).unwrap();
        assert_eq!(version, Version::new(1));
        assert_eq!(txn.status, TransactionStatus::Committed);
        assert_eq!(store.get(&path("a")).unwrap().unwrap().version, version);
        assert_eq!(store.get(&path("b")).unwrap().unwrap().version, version);
        assert_eq!(store.current_version(), version);
    }

    #[test]
    fn test_versions_increase_per_commit() {
        let store = MemoryStore::new();
        let manager = TransactionManager::default();

        for expected in 1..=3u64 {
            let mut txn = begin(&store, &manager);
            txn.put(path("a"), counter(expected as i64)).unwrap();
            assert_eq!(manager.commit(&mut txn, &store, None).unwrap(), Version::new(expected));
        }
    }

    #[test]
    fn test_read_only_commit_writes_nothing() {
        let store = MemoryStore::new();
        let manager = TransactionManager::default();
        let mut txn = begin(&store, &manager);
        txn.get(&path("a")).unwrap();

        assert_eq!(manager.commit(&mut txn, &store, None).unwrap(), Version::ZERO);
        assert!(txn.is_committed());
        assert!(store.is_empty());
    }

    #[test]
    fn test_first_committer_wins() {
        let store = MemoryStore::new();
        let manager = TransactionManager::default();

        let mut t1 = begin(&store, &manager);
        let mut t2 = begin(&store, &manager);
        for txn in [&mut t1, &mut t2] {
            assert!(txn.get(&path("a")).unwrap().is_none());
            txn.put(path("a"), counter(1)).unwrap();
        }

        manager.commit(&mut t1, &store, None).unwrap();
        let err = manager.commit(&mut t2, &store, None).unwrap_err();
        assert!(matches!(err, CommitError::ValidationFailed(_)));
        assert!(t2.is_aborted());
        assert_eq!(manager.current_version(), Version::new(1));
    }

    #[test]
    fn test_commit_appends_to_log_before_apply() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("commits.log");
        let (log, _) = CommitLog::open(&log_path, DurabilityMode::Always).unwrap();
        let log = Mutex::new(log);

        let store = MemoryStore::new();
        let manager = TransactionManager::default();
        let mut txn = begin(&store, &manager);
        txn.put(path("20250513"), counter(1)).unwrap();
        txn.delete(path("20250512")).unwrap();
        manager.commit(&mut txn, &store, Some(&log)).unwrap();

        let replay = CommitLog::read(&log_path).unwrap();
        assert_eq!(replay.records.len(), 1);
        let record = &replay.records[0];
        assert_eq!(record.txn_id, txn.txn_id);
        assert_eq!(record.version, Version::new(1));
        assert_eq!(record.writes, vec![(path("20250513"), counter(1))]);
        assert_eq!(record.deletes, vec![path("20250512")]);
    }

    #[test]
    fn test_aborted_transaction_is_not_logged() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("commits.log");
        let (log, _) = CommitLog::open(&log_path, DurabilityMode::Always).unwrap();
        let log = Mutex::new(log);

        let store = MemoryStore::new();
        let manager = TransactionManager::default();
        let mut txn = begin(&store, &manager);
        txn.put(path("a"), counter(1)).unwrap();
        manager.abort(&mut txn, "caller gave up").unwrap();

        assert!(manager.commit(&mut txn, &store, Some(&log)).is_err());
        assert!(CommitLog::read(&log_path).unwrap().records.is_empty());
        assert!(store.create_snapshot().get(&path("a")).unwrap().is_none());
    }
}
