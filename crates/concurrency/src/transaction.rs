//! Transaction context for OCC
//!
//! This module implements the core transaction data structure for optimistic
//! concurrency control. TransactionContext tracks all reads, writes and
//! deletes for a transaction, enabling validation at commit time.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};

use tally_core::{DocumentPath, SnapshotView, Storage, TallyError, TallyResult, Value, Version};
use thiserror::Error;

use crate::validation::{validate_transaction, ValidationResult};

/// Error type for commit failures
///
/// A commit either applies every buffered write or none of them.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Read-set validation found documents changed since they were read
    #[error("Commit failed: {} conflict(s)", .0.conflict_count())]
    ValidationFailed(ValidationResult),

    /// Transaction was not in the correct state for commit
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Storage could not be read during validation or written after it
    #[error("Storage error: {0}")]
    Storage(#[source] TallyError),

    /// The commit log refused the record; nothing was applied
    #[error("Commit log error: {0}")]
    Log(#[source] TallyError),
}

impl From<CommitError> for TallyError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(result) => TallyError::conflict(result.describe()),
            CommitError::InvalidState(msg) => TallyError::TransactionNotActive { state: msg },
            CommitError::Storage(inner) | CommitError::Log(inner) => inner,
        }
    }
}

/// Summary of buffered operations a commit would apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOperations {
    /// Number of pending writes
    pub puts: usize,
    /// Number of pending deletes
    pub deletes: usize,
}

impl PendingOperations {
    /// Total number of pending operations
    pub fn total(&self) -> usize {
        self.puts + self.deletes
    }

    /// Check if there are no pending operations
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Status of a transaction in its lifecycle
///
/// State transitions:
/// - `Active` → `Validating` (begin commit)
/// - `Validating` → `Committed` (validation passed)
/// - `Validating` → `Aborted` (conflict detected)
/// - `Active` → `Aborted` (closure error or explicit abort)
///
/// `Committed` and `Aborted` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is executing, can read/write
    Active,
    /// Transaction is being validated for conflicts
    Validating,
    /// Transaction committed successfully
    Committed,
    /// Transaction was aborted
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "active"),
            TransactionStatus::Validating => write!(f, "validating"),
            TransactionStatus::Committed => write!(f, "committed"),
            TransactionStatus::Aborted { reason } => write!(f, "aborted ({})", reason),
        }
    }
}

/// Transaction context for optimistic concurrency control
///
/// # Read Semantics
///
/// `get()` resolves in this order:
/// 1. **write_set**: returns this transaction's uncommitted write
/// 2. **delete_set**: returns None for an uncommitted delete
/// 3. **snapshot**: returns the snapshot value and records it in read_set
///
/// # Read-Set Tracking
///
/// Every snapshot read is recorded with the version it saw. A document that
/// was absent is recorded at version 0, so a concurrent creation of it is a
/// conflict. Writes are blind: a write without a prior read never conflicts.
///
/// # Lifecycle
///
/// 1. **BEGIN**: create with `with_snapshot()`, status is `Active`
/// 2. **READ/WRITE**: `get()`, `put()`, `delete()`, `scan_collection()`
/// 3. **VALIDATE**: `commit()` checks the read set against storage
/// 4. **COMMIT/ABORT**: status ends in `Committed` or `Aborted`
pub struct TransactionContext {
    /// Unique transaction ID
    pub txn_id: u64,

    /// Version at transaction start (snapshot version)
    pub start_version: Version,

    snapshot: Option<Box<dyn SnapshotView>>,

    /// Documents read and the version each was read at
    ///
    /// Version 0 means the document did not exist when read.
    pub read_set: HashMap<DocumentPath, Version>,

    /// Buffered writes, invisible to other transactions until commit
    pub write_set: BTreeMap<DocumentPath, Value>,

    /// Buffered deletes (read-your-deletes)
    pub delete_set: BTreeSet<DocumentPath>,

    /// Current transaction status
    pub status: TransactionStatus,

    start_time: Instant,
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("start_version", &self.start_version)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .field("deletes", &self.delete_set.len())
            .field("status", &self.status)
            .finish()
    }
}

impl TransactionContext {
    /// Create a transaction context without a snapshot
    ///
    /// Such a transaction can only write. Reads fail with `InvalidInput`.
    ///
    /// ```
    /// use tally_concurrency::TransactionContext;
    /// use tally_core::Version;
    ///
    /// let txn = TransactionContext::new(1, Version::new(100));
    /// assert!(txn.is_active());
    /// ```
    pub fn new(txn_id: u64, start_version: Version) -> Self {
        TransactionContext {
            txn_id,
            start_version,
            snapshot: None,
            read_set: HashMap::new(),
            write_set: BTreeMap::new(),
            delete_set: BTreeSet::new(),
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    /// Create a transaction context reading from `snapshot`
    ///
    /// The start version is the snapshot's version.
    pub fn with_snapshot(txn_id: u64, snapshot: Box<dyn SnapshotView>) -> Self {
        let mut txn = Self::new(txn_id, snapshot.version());
        txn.snapshot = Some(snapshot);
        txn
    }

    // === Read Operations ===

    /// Get a document as this transaction sees it
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if the transaction is not active and
    /// `InvalidInput` if it has no snapshot.
    pub fn get(&mut self, path: &DocumentPath) -> TallyResult<Option<Value>> {
        self.ensure_active()?;

        if let Some(value) = self.write_set.get(path) {
            return Ok(Some(value.clone()));
        }
        if self.delete_set.contains(path) {
            return Ok(None);
        }

        self.read_from_snapshot(path)
    }

    fn read_from_snapshot(&mut self, path: &DocumentPath) -> TallyResult<Option<Value>> {
        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| TallyError::invalid_input("Transaction has no snapshot for reads"))?;

        match snapshot.get(path)? {
            Some(vv) => {
                self.read_set.insert(path.clone(), vv.version);
                Ok(Some(vv.value))
            }
            None => {
                // Someone creating this document before we commit is a conflict
                self.read_set.insert(path.clone(), Version::ZERO);
                Ok(None)
            }
        }
    }

    /// Check if a document exists in this transaction's view
    ///
    /// Tracks the read like `get()`.
    ///
    /// # Errors
    ///
    /// Same as [`TransactionContext::get`].
    pub fn exists(&mut self, path: &DocumentPath) -> TallyResult<bool> {
        Ok(self.get(path)?.is_some())
    }

    /// Scan every document of a collection, sorted by id
    ///
    /// Includes this transaction's uncommitted writes and excludes its
    /// uncommitted deletes. Every snapshot document returned is tracked in
    /// the read set. Documents created by others after the snapshot are not
    /// detected (phantoms are allowed).
    ///
    /// # Errors
    ///
    /// Same as [`TransactionContext::get`].
    pub fn scan_collection(&mut self, collection: &str) -> TallyResult<Vec<(DocumentPath, Value)>> {
        self.ensure_active()?;

        let snapshot = self
            .snapshot
            .as_ref()
            .ok_or_else(|| TallyError::invalid_input("Transaction has no snapshot for reads"))?;

        let mut results: BTreeMap<DocumentPath, Value> = BTreeMap::new();
        for (path, vv) in snapshot.scan_collection(collection)? {
            if !self.delete_set.contains(&path) {
                self.read_set.insert(path.clone(), vv.version);
                results.insert(path, vv.value);
            }
        }

        for (path, value) in &self.write_set {
            if path.is_in(collection) {
                results.insert(path.clone(), value.clone());
            }
        }

        Ok(results.into_iter().collect())
    }

    /// Version recorded for a document in the read set
    ///
    /// `Some(Version::ZERO)` means it was read and did not exist.
    pub fn get_read_version(&self, path: &DocumentPath) -> Option<Version> {
        self.read_set.get(path).copied()
    }

    // === Write Operations ===

    /// Buffer a write
    ///
    /// Replaces any earlier write or delete of the same path in this
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if the transaction is not active.
    pub fn put(&mut self, path: DocumentPath, value: Value) -> TallyResult<()> {
        self.ensure_active()?;
        self.delete_set.remove(&path);
        self.write_set.insert(path, value);
        Ok(())
    }

    /// Buffer a delete
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if the transaction is not active.
    pub fn delete(&mut self, path: DocumentPath) -> TallyResult<()> {
        self.ensure_active()?;
        self.write_set.remove(&path);
        self.delete_set.insert(path);
        Ok(())
    }

    // === State Management ===

    /// Check if transaction is in Active state
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Check if transaction is committed
    pub fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Committed)
    }

    /// Check if transaction is aborted
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Check if transaction can still be rolled back
    pub fn can_rollback(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Active | TransactionStatus::Validating
        )
    }

    /// Time since the transaction began
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Check if the transaction has run longer than `timeout`
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.elapsed() > timeout
    }

    /// Check the transaction can accept operations
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if not in `Active` state.
    pub fn ensure_active(&self) -> TallyResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TallyError::TransactionNotActive {
                state: self.status.to_string(),
            })
        }
    }

    /// `Active` → `Validating`
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if not in `Active` state.
    pub fn mark_validating(&mut self) -> TallyResult<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// `Validating` → `Committed`
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` from any other state.
    pub fn mark_committed(&mut self) -> TallyResult<()> {
        match self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            _ => Err(TallyError::TransactionNotActive {
                state: self.status.to_string(),
            }),
        }
    }

    /// Abort the transaction and discard its buffered writes
    ///
    /// The read set is kept for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns `TransactionNotActive` if already committed or aborted.
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> TallyResult<()> {
        if !self.can_rollback() {
            return Err(TallyError::TransactionNotActive {
                state: self.status.to_string(),
            });
        }
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
        self.write_set.clear();
        self.delete_set.clear();
        Ok(())
    }

    /// Counts of buffered operations
    pub fn pending_operations(&self) -> PendingOperations {
        PendingOperations {
            puts: self.write_set.len(),
            deletes: self.delete_set.len(),
        }
    }

    // === Commit Operation ===

    /// Validate the transaction against current storage
    ///
    /// `Active` → `Validating` → `Committed` when the read set is unchanged,
    /// otherwise `Aborted`. This performs the state transitions only;
    /// durability and visibility are the [`crate::TransactionManager`]'s job,
    /// which also holds the commit lock that makes validate-then-apply atomic.
    ///
    /// # Errors
    ///
    /// - `CommitError::InvalidState` if not `Active`
    /// - `CommitError::ValidationFailed` on a read-set conflict
    /// - `CommitError::Storage` if storage could not be read
    pub fn commit<S: Storage + ?Sized>(&mut self, store: &S) -> Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState(format!(
                "cannot commit transaction {} from {} state",
                self.txn_id, self.status
            )));
        }
        self.status = TransactionStatus::Validating;

        let validation = match validate_transaction(self, store) {
            Ok(validation) => validation,
            Err(e) => {
                self.status = TransactionStatus::Aborted {
                    reason: format!("validation could not read storage: {}", e),
                };
                return Err(CommitError::Storage(e));
            }
        };

        if !validation.is_valid() {
            self.status = TransactionStatus::Aborted {
                reason: format!(
                    "Commit failed: {} conflict(s) detected",
                    validation.conflict_count()
                ),
            };
            return Err(CommitError::ValidationFailed(validation));
        }

        self.status = TransactionStatus::Committed;
        Ok(())
    }

    // === Introspection ===

    /// Number of documents in the read set
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Number of buffered writes
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    /// Number of buffered deletes
    pub fn delete_count(&self) -> usize {
        self.delete_set.len()
    }

    /// Check if the transaction buffered no writes or deletes
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty() && self.delete_set.is_empty()
    }

    /// Abort reason, if aborted
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// Buffered writes in path order
    pub fn writes(&self) -> Vec<(DocumentPath, Value)> {
        self.write_set
            .iter()
            .map(|(path, value)| (path.clone(), value.clone()))
            .collect()
    }

    /// Buffered deletes in path order
    pub fn deletes(&self) -> Vec<DocumentPath> {
        self.delete_set.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Timestamp;
    use tally_storage::MemoryStore;

    fn counter_path(day: &str) -> DocumentPath {
        DocumentPath::new("counters", day).unwrap()
    }

    fn counter(count: i64) -> Value {
        Value::object().with_field("count", count)
    }

    fn begin(store: &MemoryStore, txn_id: u64) -> TransactionContext {
        TransactionContext::with_snapshot(txn_id, Box::new(store.create_snapshot()))
    }

    fn seed(store: &MemoryStore, path: &DocumentPath, value: Value, version: u64) {
        store
            .apply_batch(&[(path.clone(), value)], &[], Version::new(version), Timestamp::now())
            .unwrap();
    }

    #[test]
    fn test_read_absent_tracks_version_zero() {
        let store = MemoryStore::new();
        let mut txn = begin(&store, 1);
        let path = counter_path("20250513");

        assert_eq!(txn.get(&path).unwrap(), None);
        assert_eq!(txn.get_read_version(&path), Some(Version::ZERO));
    }

    #[test]
    fn test_read_existing_tracks_version() {
        let store = MemoryStore::new();
        let path = counter_path("20250513");
        seed(&store, &path, counter(4), 7);

        let mut txn = begin(&store, 1);
        assert_eq!(txn.get(&path).unwrap(), Some(counter(4)));
        assert_eq!(txn.get_read_version(&path), Some(Version::new(7)));
        assert_eq!(txn.start_version, Version::new(7));
    }

    #[test]
    fn test_read_your_writes_and_deletes() {
        let store = MemoryStore::new();
        let path = counter_path("20250513");
        seed(&store, &path, counter(1), 1);

        let mut txn = begin(&store, 1);
        txn.put(path.clone(), counter(2)).unwrap();
        assert_eq!(txn.get(&path).unwrap(), Some(counter(2)));
        // Own writes do not enter the read set
        assert!(txn.get_read_version(&path).is_none());

        txn.delete(path.clone()).unwrap();
        assert_eq!(txn.get(&path).unwrap(), None);
        assert!(!txn.exists(&path).unwrap());
        assert_eq!(txn.pending_operations(), PendingOperations { puts: 0, deletes: 1 });
    }

    #[test]
    fn test_writes_invisible_to_other_snapshots() {
        let store = MemoryStore::new();
        let path = counter_path("20250513");

        let mut writer = begin(&store, 1);
        writer.put(path.clone(), counter(1)).unwrap();

        let mut reader = begin(&store, 2);
        assert_eq!(reader.get(&path).unwrap(), None);
    }

    #[test]
    fn test_scan_collection_merges_write_set() {
        let store = MemoryStore::new();
        seed(&store, &counter_path("20250513"), counter(3), 1);
        seed(&store, &counter_path("20250514"), counter(1), 2);

        let mut txn = begin(&store, 1);
        txn.put(counter_path("20250515"), counter(1)).unwrap();
        txn.delete(counter_path("20250514")).unwrap();
        txn.put(DocumentPath::new("reports", "20250515-0001").unwrap(), Value::object())
            .unwrap();

        let ids: Vec<String> = txn
            .scan_collection("counters")
            .unwrap()
            .into_iter()
            .map(|(p, _)| p.id().to_string())
            .collect();
        assert_eq!(ids, vec!["20250513", "20250515"]);
        assert_eq!(txn.read_count(), 1);
    }

    #[test]
    fn test_no_snapshot_cannot_read() {
        let mut txn = TransactionContext::new(1, Version::ZERO);
        let err = txn.get(&counter_path("20250513")).unwrap_err();
        assert!(matches!(err, TallyError::InvalidInput { .. }));
        // Blind writes are still allowed
        txn.put(counter_path("20250513"), counter(1)).unwrap();
    }

    #[test]
    fn test_state_transitions() {
        let mut txn = TransactionContext::new(1, Version::ZERO);
        assert!(txn.mark_committed().is_err());

        txn.mark_validating().unwrap();
        assert!(!txn.is_active());
        assert!(txn.put(counter_path("x"), counter(1)).is_err());

        txn.mark_committed().unwrap();
        assert!(txn.is_committed());
        assert!(txn.mark_aborted("too late").is_err());
    }

    #[test]
    fn test_abort_discards_writes() {
        let mut txn = TransactionContext::new(1, Version::ZERO);
        txn.put(counter_path("20250513"), counter(1)).unwrap();
        txn.mark_aborted("closure failed").unwrap();

        assert!(txn.is_aborted());
        assert_eq!(txn.abort_reason(), Some("closure failed"));
        assert!(txn.is_read_only());
        assert!(matches!(
            txn.get(&counter_path("20250513")),
            Err(TallyError::TransactionNotActive { .. })
        ));
        assert!(txn.mark_aborted("again").is_err());
    }

    #[test]
    fn test_commit_detects_concurrent_creation() {
        let store = MemoryStore::new();
        let path = counter_path("20250513");

        let mut txn = begin(&store, 1);
        assert!(txn.get(&path).unwrap().is_none());
        txn.put(path.clone(), counter(1)).unwrap();

        // Another writer creates the counter first
        seed(&store, &path, counter(1), 1);

        let err = txn.commit(&store).unwrap_err();
        assert!(matches!(err, CommitError::ValidationFailed(_)));
        assert!(txn.is_aborted());

        let tally_err: TallyError = err.into();
        assert!(tally_err.is_conflict());
    }

    #[test]
    fn test_commit_blind_write_never_conflicts() {
        let store = MemoryStore::new();
        let path = counter_path("20250513");

        let mut txn = begin(&store, 1);
        txn.put(path.clone(), counter(9)).unwrap();
        seed(&store, &path, counter(1), 1);

        txn.commit(&store).unwrap();
        assert!(txn.is_committed());
    }

    #[test]
    fn test_commit_twice_is_invalid_state() {
        let store = MemoryStore::new();
        let mut txn = begin(&store, 1);
        txn.commit(&store).unwrap();

        let err = txn.commit(&store).unwrap_err();
        assert!(matches!(err, CommitError::InvalidState(_)));
        let tally_err: TallyError = err.into();
        assert!(matches!(tally_err, TallyError::TransactionNotActive { .. }));
    }

    #[test]
    fn test_writes_and_deletes_are_path_ordered() {
        let mut txn = TransactionContext::new(1, Version::ZERO);
        txn.put(counter_path("b"), counter(2)).unwrap();
        txn.put(counter_path("a"), counter(1)).unwrap();
        txn.delete(counter_path("d")).unwrap();
        txn.delete(counter_path("c")).unwrap();

        let writes: Vec<&str> = txn.write_set.keys().map(|p| p.id()).collect();
        assert_eq!(writes, vec!["a", "b"]);
        assert_eq!(txn.deletes(), vec![counter_path("c"), counter_path("d")]);
        assert_eq!(txn.writes()[0], (counter_path("a"), counter(1)));
    }
}
