//! MemoryStore: in-memory document storage with version management
//!
//! This module implements the Storage trait using:
//! - `BTreeMap<DocumentPath, VersionedValue>` for ordered document storage
//! - `parking_lot::RwLock` for thread-safe access
//! - `AtomicU64` tracking the highest applied commit version
//!
//! # Design Notes
//!
//! - **No version history**: each path stores only its latest committed value
//! - **Deletes remove the entry**: a deleted document reads as absent (version 0)
//! - **Batch atomicity**: `apply_batch` holds the write lock for the whole
//!   batch, so snapshots never observe half a transaction

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use tally_core::{
    DocumentPath, SnapshotView, Storage, TallyError, TallyResult, Timestamp, Value, Version,
    VersionedValue,
};

use crate::snapshot::ClonedSnapshotView;

/// In-memory document store
///
/// Thread-safe through `parking_lot::RwLock` and `AtomicU64`.
/// Versions are assigned by the transaction layer; the store only records
/// the highest one applied.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Ordered map from path to latest committed document
    data: Arc<RwLock<BTreeMap<DocumentPath, VersionedValue>>>,
    /// Highest commit version applied
    version: AtomicU64,
}

impl MemoryStore {
    /// Create a new empty store at version 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store holds no documents
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Create a snapshot of the current state
    ///
    /// Deep-clones the map: O(n) in the number of documents.
    pub fn create_snapshot(&self) -> ClonedSnapshotView {
        // Read lock BEFORE reading the version: a batch applied between the
        // two would otherwise carry a version above the snapshot's and be
        // hidden from it.
        let data = self.data.read();
        let version = self.current_version();
        ClonedSnapshotView::new(version, data.clone())
    }
}

impl Storage for MemoryStore {
    fn get(&self, path: &DocumentPath) -> TallyResult<Option<VersionedValue>> {
        Ok(self.data.read().get(path).cloned())
    }

    fn scan_collection(
        &self,
        collection: &str,
        max_version: Version,
    ) -> TallyResult<Vec<(DocumentPath, VersionedValue)>> {
        let data = self.data.read();
        Ok(data
            .range(DocumentPath::collection_floor(collection)..)
            .take_while(|(path, _)| path.is_in(collection))
            .filter(|(_, vv)| vv.version <= max_version)
            .map(|(path, vv)| (path.clone(), vv.clone()))
            .collect())
    }

    fn current_version(&self) -> Version {
        Version::new(self.version.load(Ordering::SeqCst))
    }

    fn apply_batch(
        &self,
        writes: &[(DocumentPath, Value)],
        deletes: &[DocumentPath],
        version: Version,
        timestamp: Timestamp,
    ) -> TallyResult<()> {
        if version.is_zero() {
            return Err(TallyError::internal("cannot apply a batch at version 0"));
        }

        let mut data = self.data.write();

        for (path, value) in writes {
            data.insert(
                path.clone(),
                VersionedValue::with_timestamp(value.clone(), version, timestamp),
            );
        }
        for path in deletes {
            data.remove(path);
        }

        // Still under the write lock: snapshots read data and version together
        self.version.fetch_max(version.as_u64(), Ordering::SeqCst);

        trace!(
            target: "tally::storage",
            version = version.as_u64(),
            writes = writes.len(),
            deletes = deletes.len(),
            "batch applied"
        );
        Ok(())
    }

    fn snapshot(&self) -> Box<dyn SnapshotView> {
        Box::new(self.create_snapshot())
    }
}
