//! Core traits for storage and snapshot abstraction
//!
//! `Storage` is the contract the concurrency layer validates and commits
//! against. `SnapshotView` is the point-in-time view a transaction reads from.
//! Keeping both behind traits lets tests wrap the in-memory store with fault
//! injection without touching the upper layers.

use crate::contract::{Timestamp, Version, VersionedValue};
use crate::error::TallyResult;
use crate::types::DocumentPath;
use crate::value::Value;

/// Storage abstraction for the document store
///
/// Thread safety: All methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait Storage: Send + Sync {
    /// Get the latest committed version of a document
    ///
    /// Returns `None` if the document does not exist. An existing document
    /// with an empty object body is `Some`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get(&self, path: &DocumentPath) -> TallyResult<Option<VersionedValue>>;

    /// Scan every document of a collection visible at or before `max_version`
    ///
    /// Results are sorted by document id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn scan_collection(
        &self,
        collection: &str,
        max_version: Version,
    ) -> TallyResult<Vec<(DocumentPath, VersionedValue)>>;

    /// Highest commit version applied so far
    fn current_version(&self) -> Version;

    /// Apply a committed write set atomically
    ///
    /// All writes and deletes become visible together, labeled with
    /// `version` and `timestamp`. No reader may observe a partial batch.
    /// On error nothing has been applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn apply_batch(
        &self,
        writes: &[(DocumentPath, Value)],
        deletes: &[DocumentPath],
        version: Version,
        timestamp: Timestamp,
    ) -> TallyResult<()>;

    /// Create a point-in-time view at the current version
    fn snapshot(&self) -> Box<dyn SnapshotView>;
}

/// Snapshot view abstraction for snapshot isolation
///
/// Thread safety: Must be safe to pass between threads (Send + Sync).
pub trait SnapshotView: Send + Sync {
    /// Get a document as it existed at the snapshot version
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get(&self, path: &DocumentPath) -> TallyResult<Option<VersionedValue>>;

    /// Scan a collection as it existed at the snapshot version
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn scan_collection(&self, collection: &str) -> TallyResult<Vec<(DocumentPath, VersionedValue)>>;

    /// Version this snapshot was taken at
    fn version(&self) -> Version;
}
