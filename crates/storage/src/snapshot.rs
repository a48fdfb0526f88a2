//! ClonedSnapshotView: snapshot implementation via deep clone
//!
//! This module provides version-bounded views of storage for transaction isolation.
//! The snapshot clones the document map at creation time.
//!
//! - **Immutable**: once created, the snapshot never changes
//! - **Thread-safe**: the cloned map is Arc-wrapped and shareable
//! - **Version-bounded**: only returns documents visible at the snapshot version

use std::collections::BTreeMap;
use std::sync::Arc;

use tally_core::{DocumentPath, SnapshotView, TallyResult, Version, VersionedValue};

/// A snapshot view holding a full clone of the document map
///
/// # Example
///
/// ```
/// use tally_core::{DocumentPath, SnapshotView, Storage, Timestamp, Value, Version};
/// use tally_storage::MemoryStore;
///
/// let store = MemoryStore::new();
/// let snapshot = store.create_snapshot();
///
/// let path = DocumentPath::new("counters", "20250513").unwrap();
/// store
///     .apply_batch(&[(path.clone(), Value::object())], &[], Version::new(1), Timestamp::now())
///     .unwrap();
///
/// // Writes after snapshot creation are not visible
/// assert!(snapshot.get(&path).unwrap().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct ClonedSnapshotView {
    version: Version,
    data: Arc<BTreeMap<DocumentPath, VersionedValue>>,
}

impl ClonedSnapshotView {
    /// Create a snapshot from already-cloned data
    ///
    /// Normally called by `MemoryStore::create_snapshot()`.
    pub fn new(version: Version, data: BTreeMap<DocumentPath, VersionedValue>) -> Self {
        Self {
            version,
            data: Arc::new(data),
        }
    }

    /// Create an empty snapshot at the given version
    pub fn empty(version: Version) -> Self {
        Self::new(version, BTreeMap::new())
    }
}

impl SnapshotView for ClonedSnapshotView {
    fn get(&self, path: &DocumentPath) -> TallyResult<Option<VersionedValue>> {
        match self.data.get(path) {
            Some(vv) if vv.version <= self.version => Ok(Some(vv.clone())),
            _ => Ok(None),
        }
    }

    fn scan_collection(
        &self,
        collection: &str,
    ) -> TallyResult<Vec<(DocumentPath, VersionedValue)>> {
        Ok(self
            .data
            .range(DocumentPath::collection_floor(collection)..)
            .take_while(|(path, _)| path.is_in(collection))
            .filter(|(_, vv)| vv.version <= self.version)
            .map(|(path, vv)| (path.clone(), vv.clone()))
            .collect())
    }

    fn version(&self) -> Version {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use tally_core::{Storage, Timestamp, Value};

    fn path(id: &str) -> DocumentPath {
        DocumentPath::new("counters", id).unwrap()
    }

    #[test]
    fn test_snapshot_captures_version() {
        let store = MemoryStore::new();
        store
            .apply_batch(&[(path("a"), Value::Int(1))], &[], Version::new(1), Timestamp::now())
            .unwrap();

        let snapshot = store.create_snapshot();
        assert_eq!(snapshot.version(), Version::new(1));
        assert_eq!(snapshot.get(&path("a")).unwrap().unwrap().value, Value::Int(1));
    }

    #[test]
    fn test_snapshot_isolated_from_later_writes() {
        let store = MemoryStore::new();
        store
            .apply_batch(&[(path("a"), Value::Int(1))], &[], Version::new(1), Timestamp::now())
            .unwrap();
        let snapshot = store.create_snapshot();

        store
            .apply_batch(
                &[(path("a"), Value::Int(2))],
                &[path("b")],
                Version::new(2),
                Timestamp::now(),
            )
            .unwrap();
        store
            .apply_batch(&[(path("c"), Value::Int(3))], &[], Version::new(3), Timestamp::now())
            .unwrap();

        assert_eq!(snapshot.get(&path("a")).unwrap().unwrap().value, Value::Int(1));
        assert!(snapshot.get(&path("c")).unwrap().is_none());
        assert_eq!(snapshot.scan_collection("counters").unwrap().len(), 1);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ClonedSnapshotView::empty(Version::new(10));
        assert_eq!(snapshot.version(), Version::new(10));
        assert!(snapshot.get(&path("a")).unwrap().is_none());
        assert!(snapshot.scan_collection("counters").unwrap().is_empty());
    }
}
