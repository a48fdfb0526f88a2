//! Database struct and open/close logic
//!
//! This module provides the main Database struct that orchestrates:
//! - Storage initialization
//! - Commit log opening and replay
//! - Transaction API
//!
//! ## Transaction API
//!
//! 1. **Closure API** (recommended): `db.transaction(|txn| { ... })`
//!    - Automatic commit on success, abort on error
//!    - `transaction_with_retry` re-runs the closure on conflict
//!
//! 2. **Manual API**: `begin_transaction()` + `commit_transaction()`
//!    - For cases requiring external control over commit timing

pub mod config;
mod registry;
mod transactions;

pub use config::{TallyConfig, CONFIG_FILE_NAME};
pub use registry::OPEN_DATABASES;
pub use transactions::RetryConfig;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tally_concurrency::TransactionContext;
use tally_core::{
    DateBasis, DocumentPath, Storage, TallyError, TallyResult, Version, VersionedValue,
};
use tally_durability::{CommitLog, DurabilityMode, COMMIT_LOG_FILE_NAME};
use tally_storage::MemoryStore;
use tracing::{debug, info, warn};

use crate::coordinator::{ActiveTransaction, TransactionCoordinator, TransactionMetrics};
use crate::replay::{replay_into, RecoveryStats};

/// How long `shutdown` waits for in-flight transactions
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Main database struct with transaction support
///
/// Orchestrates storage, the commit log, replay, and transactions.
/// Create one with [`Database::open`] or [`Database::ephemeral`].
///
/// # Example
///
/// ```text
/// use tally_engine::Database;
///
/// let db = Database::open("/path/to/data")?;
/// let count = db.transaction(|txn| {
///     txn.put(path, value)?;
///     Ok(())
/// })?;
/// ```
pub struct Database {
    /// Canonical data directory (empty for ephemeral databases)
    data_dir: PathBuf,

    storage: Arc<MemoryStore>,

    /// None for ephemeral databases
    commit_log: Option<Mutex<CommitLog>>,

    coordinator: TransactionCoordinator,

    durability_mode: DurabilityMode,

    config: TallyConfig,

    date_basis: DateBasis,

    /// Set to false during shutdown to reject new transactions
    accepting_transactions: AtomicBool,

    /// Exclusive lock file preventing a second process from appending to
    /// the same commit log. None for ephemeral databases.
    _lock_file: Option<std::fs::File>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.data_dir)
            .field("durability_mode", &self.durability_mode)
            .field("date_basis", &self.date_basis)
            .field("current_version", &self.coordinator.current_version())
            .field("is_open", &self.is_open())
            .finish()
    }
}

impl Database {
    /// Open database at given path, replaying its commit log
    ///
    /// Reads `tally.toml` from the data directory, creating it with defaults
    /// if missing. Opening the same path twice in one process returns the
    /// same `Arc<Database>`.
    ///
    /// # Flow
    ///
    /// 1. Create data directory if needed
    /// 2. Read or create `tally.toml`
    /// 3. Return the registered instance for this path, if any
    /// 4. Otherwise: lock, open the commit log, replay, register
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid, the directory is locked by another
    /// process, or the commit log is corrupt.
    pub fn open<P: AsRef<Path>>(path: P) -> TallyResult<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let config_path = data_dir.join(CONFIG_FILE_NAME);
        TallyConfig::write_default_if_missing(&config_path)?;
        let cfg = TallyConfig::from_file(&config_path)?;

        Self::open_internal(&data_dir, cfg)
    }

    /// Open database at the given path with an explicit configuration
    ///
    /// The config is written to `tally.toml` so later `open()` calls pick up
    /// the same settings.
    ///
    /// # Errors
    ///
    /// Same as [`Database::open`], plus config validation errors.
    pub fn open_with_config<P: AsRef<Path>>(path: P, cfg: TallyConfig) -> TallyResult<Arc<Self>> {
        let data_dir = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        cfg.validate()?;
        cfg.write_to_file(&data_dir.join(CONFIG_FILE_NAME))?;

        Self::open_internal(&data_dir, cfg)
    }

    fn open_internal(data_dir: &Path, cfg: TallyConfig) -> TallyResult<Arc<Self>> {
        let durability_mode = cfg.durability_mode()?;
        let date_basis = cfg.date_basis()?;

        // Canonicalize for consistent registry keys
        let canonical_path = data_dir.canonicalize()?;

        // Held for the whole open so two threads cannot both create an instance
        let mut registry = OPEN_DATABASES.lock();

        if let Some(db) = registry.get(&canonical_path).and_then(|weak| weak.upgrade()) {
            debug!(
                target: "tally::db",
                path = ?canonical_path,
                "Returning existing database instance"
            );
            return Ok(db);
        }

        let lock_path = canonical_path.join(".lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| TallyError::storage(format!("failed to open lock file: {}", e)))?;
        fs2::FileExt::try_lock_exclusive(&lock_file).map_err(|_| {
            TallyError::storage(format!(
                "database at '{}' is already in use by another process",
                canonical_path.display()
            ))
        })?;

        let storage = Arc::new(MemoryStore::new());
        let (commit_log, stats) = if durability_mode.requires_log() {
            let (log, replay) =
                CommitLog::open(canonical_path.join(COMMIT_LOG_FILE_NAME), durability_mode)?;
            let stats = replay_into(&storage, &replay)?;
            (Some(Mutex::new(log)), stats)
        } else {
            (None, RecoveryStats::default())
        };

        info!(
            target: "tally::db",
            path = ?canonical_path,
            durability = durability_mode.description(),
            date_basis = %date_basis,
            txns_replayed = stats.txns_replayed,
            writes_applied = stats.writes_applied,
            final_version = stats.final_version.as_u64(),
            discarded_bytes = stats.discarded_bytes,
            "Database opened"
        );

        let db = Arc::new(Self {
            data_dir: canonical_path.clone(),
            storage,
            commit_log,
            coordinator: TransactionCoordinator::from_recovery(&stats),
            durability_mode,
            config: cfg,
            date_basis,
            accepting_transactions: AtomicBool::new(true),
            _lock_file: Some(lock_file),
        });

        registry.insert(canonical_path, Arc::downgrade(&db));
        Ok(db)
    }

    /// Create an in-memory database with no files
    ///
    /// Data is lost when the last handle is dropped. Uses the default
    /// configuration.
    pub fn ephemeral() -> TallyResult<Arc<Self>> {
        Self::ephemeral_with_config(TallyConfig::default())
    }

    /// Create an in-memory database with the given configuration
    ///
    /// The durability setting is ignored; nothing is logged.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the config does not validate.
    pub fn ephemeral_with_config(cfg: TallyConfig) -> TallyResult<Arc<Self>> {
        cfg.validate()?;
        let date_basis = cfg.date_basis()?;

        Ok(Arc::new(Self {
            data_dir: PathBuf::new(),
            storage: Arc::new(MemoryStore::new()),
            commit_log: None,
            coordinator: TransactionCoordinator::new(Version::ZERO),
            durability_mode: DurabilityMode::Cache,
            config: cfg,
            date_basis,
            accepting_transactions: AtomicBool::new(true),
            _lock_file: None,
        }))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Data directory (empty for ephemeral databases)
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Check whether this database has no backing files
    pub fn is_ephemeral(&self) -> bool {
        self.commit_log.is_none()
    }

    /// Underlying store
    pub fn storage(&self) -> &Arc<MemoryStore> {
        &self.storage
    }

    /// Configuration the database was opened with
    pub fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Active durability mode
    pub fn durability_mode(&self) -> DurabilityMode {
        self.durability_mode
    }

    /// Calendar used for case ID date prefixes
    pub fn date_basis(&self) -> DateBasis {
        self.date_basis
    }

    /// Retry policy from the configuration
    pub fn retry_config(&self) -> &RetryConfig {
        &self.config.retry
    }

    /// Transaction statistics
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    /// Last published commit version
    pub fn current_version(&self) -> Version {
        self.coordinator.current_version()
    }

    /// Check whether the database still accepts transactions
    pub fn is_open(&self) -> bool {
        self.accepting_transactions.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Non-transactional reads
    // ========================================================================

    /// Read the latest committed state of one document
    pub fn get_document(&self, path: &DocumentPath) -> TallyResult<Option<VersionedValue>> {
        self.storage.get(path)
    }

    /// Read every document of a collection as of the latest commit
    pub fn scan_collection(
        &self,
        collection: &str,
    ) -> TallyResult<Vec<(DocumentPath, VersionedValue)>> {
        self.storage
            .scan_collection(collection, self.storage.current_version())
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Force the commit log to disk
    ///
    /// For ephemeral databases, this is a no-op.
    pub fn flush(&self) -> TallyResult<()> {
        match &self.commit_log {
            Some(log) => log.lock().sync(),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Transaction API
    // ========================================================================

    fn check_accepting(&self) -> TallyResult<()> {
        if !self.accepting_transactions.load(Ordering::SeqCst) {
            return Err(TallyError::Closed);
        }
        Ok(())
    }

    /// Execute one transaction attempt: commit on success, abort on error
    fn run_single_attempt<T>(
        &self,
        txn: &mut TransactionContext,
        result: TallyResult<T>,
    ) -> TallyResult<(T, Version)> {
        match result {
            Ok(value) => {
                let commit_version = self.commit_transaction(txn)?;
                Ok((value, commit_version))
            }
            Err(e) => {
                // Only fails if the closure already finished the transaction
                txn.mark_aborted(format!("Closure error: {}", e)).ok();
                Err(e)
            }
        }
    }

    /// Execute a transaction with the given closure
    ///
    /// Commits if the closure returns `Ok`, aborts and discards every
    /// buffered write if it returns `Err`.
    ///
    /// # Errors
    ///
    /// The closure's error, `TransactionConflict` if a read document
    /// changed before commit, or `Closed` after shutdown.
    pub fn transaction<F, T>(&self, f: F) -> TallyResult<T>
    where
        F: FnOnce(&mut TransactionContext) -> TallyResult<T>,
    {
        self.transaction_with_version(f).map(|(value, _)| value)
    }

    /// Like [`Database::transaction`], also returning the commit version
    pub fn transaction_with_version<F, T>(&self, f: F) -> TallyResult<(T, Version)>
    where
        F: FnOnce(&mut TransactionContext) -> TallyResult<T>,
    {
        self.check_accepting()?;
        let mut txn = self.begin_transaction();
        let result = f(&mut txn);
        self.run_single_attempt(&mut txn, result)
    }

    /// Execute a transaction with automatic retry on conflict
    ///
    /// Each attempt runs the closure against a fresh snapshot. The closure
    /// is called repeatedly until either:
    /// - The transaction commits
    /// - A non-conflict error occurs (not retried)
    /// - `config.max_retries` retries are spent
    ///
    /// # Errors
    ///
    /// The last error seen. On exhaustion this is the final conflict.
    pub fn transaction_with_retry<F, T>(&self, config: &RetryConfig, f: F) -> TallyResult<T>
    where
        F: Fn(&mut TransactionContext) -> TallyResult<T>,
    {
        self.check_accepting()?;

        let mut last_error = None;

        for attempt in 0..=config.max_retries {
            let mut txn = self.begin_transaction();
            let result = f(&mut txn);
            let outcome = self.run_single_attempt(&mut txn, result);
            // Settle this attempt before backing off
            drop(txn);

            match outcome {
                Ok((value, _)) => return Ok(value),
                Err(e) if e.is_conflict() && attempt < config.max_retries => {
                    let delay = config.calculate_delay(attempt);
                    debug!(
                        target: "tally::txn",
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying conflicted transaction"
                    );
                    last_error = Some(e);
                    std::thread::sleep(delay);
                }
                Err(e) => {
                    if e.is_conflict() {
                        warn!(
                            target: "tally::txn",
                            attempts = attempt + 1,
                            error = %e,
                            "Transaction retry budget exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }

        // The loop returns on its final attempt
        Err(last_error.unwrap_or_else(|| {
            TallyError::internal("retry loop exited without returning a result")
        }))
    }

    /// Begin a new transaction (for manual control)
    ///
    /// Commit it with [`Database::commit_transaction`]. Dropping it without
    /// a commit aborts it and discards its writes.
    pub fn begin_transaction(&self) -> ActiveTransaction<'_> {
        self.coordinator.start_transaction(&self.storage)
    }

    /// Commit a transaction
    ///
    /// Returns the commit version assigned to every write in it.
    ///
    /// # Errors
    ///
    /// - `TransactionConflict` if validation failed; the transaction is aborted
    /// - `TransactionNotActive` if it already finished
    /// - the commit log's error if the append failed
    pub fn commit_transaction(&self, txn: &mut TransactionContext) -> TallyResult<Version> {
        self.coordinator
            .commit(txn, &self.storage, self.commit_log.as_ref())
    }

    // ========================================================================
    // Graceful Shutdown
    // ========================================================================

    /// Stop accepting transactions and persist the commit log
    ///
    /// Waits up to 30 seconds for in-flight transactions first.
    pub fn shutdown(&self) -> TallyResult<()> {
        self.accepting_transactions.store(false, Ordering::SeqCst);

        if !self.coordinator.wait_for_idle(SHUTDOWN_DRAIN_TIMEOUT) {
            warn!(
                target: "tally::db",
                active = self.coordinator.active_count(),
                "Shutting down with transactions still in flight"
            );
        }

        self.flush()?;
        info!(target: "tally::db", path = ?self.data_dir, "Database shut down");
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(target: "tally::db", error = %e, "Final commit log flush failed");
        }

        if !self.data_dir.as_os_str().is_empty() {
            let mut registry = OPEN_DATABASES.lock();
            // A newer instance may already be registered under this path
            if registry
                .get(&self.data_dir)
                .is_some_and(|weak| weak.strong_count() == 0)
            {
                registry.remove(&self.data_dir);
            }
        }
    }
}
