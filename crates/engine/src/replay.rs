//! Commit log replay
//!
//! Rebuilds the in-memory store from the records a `CommitLog` returned on
//! open. Records are applied in log order with their original versions and
//! timestamps, so documents read back exactly as they were committed.

use tally_core::{Storage, TallyError, TallyResult, Version};
use tally_durability::ReplayResult;
use tally_storage::MemoryStore;

/// Statistics from replaying a commit log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    /// Committed transactions applied
    pub txns_replayed: usize,
    /// Document writes applied
    pub writes_applied: usize,
    /// Document deletes applied
    pub deletes_applied: usize,
    /// Version of the last applied record (`Version::ZERO` for an empty log)
    pub final_version: Version,
    /// Highest transaction id in the log
    pub max_txn_id: u64,
    /// Torn tail bytes dropped from the end of the log
    pub discarded_bytes: u64,
}

/// Apply every replayed record to `store`
///
/// # Errors
///
/// Returns `Corruption` if record versions do not strictly increase, and
/// propagates storage errors.
pub fn replay_into(store: &MemoryStore, replay: &ReplayResult) -> TallyResult<RecoveryStats> {
    let mut stats = RecoveryStats {
        discarded_bytes: replay.discarded_bytes,
        max_txn_id: replay.max_txn_id(),
        ..RecoveryStats::default()
    };

    for record in &replay.records {
        if record.version <= stats.final_version {
            return Err(TallyError::corruption(format!(
                "commit log version went from {} to {} at txn {}",
                stats.final_version, record.version, record.txn_id
            )));
        }

        store.apply_batch(&record.writes, &record.deletes, record.version, record.timestamp)?;

        stats.txns_replayed += 1;
        stats.writes_applied += record.writes.len();
        stats.deletes_applied += record.deletes.len();
        stats.final_version = record.version;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{DocumentPath, Timestamp, Value};
    use tally_durability::CommitRecord;

    fn record(txn_id: u64, version: u64, count: i64) -> CommitRecord {
        CommitRecord {
            txn_id,
            version: Version::new(version),
            timestamp: Timestamp::from_secs(1_747_094_400 + version),
            writes: vec![(
                DocumentPath::new("counters", "20250513").unwrap(),
                Value::object().with_field("count", count),
            )],
            deletes: vec![],
        }
    }

    #[test]
    fn test_replay_empty() {
        let store = MemoryStore::new();
        let stats = replay_into(&store, &ReplayResult::default()).unwrap();
        assert_eq!(stats, RecoveryStats::default());
        assert!(store.is_empty());
    }

    #[test]
    fn test_replay_applies_in_order() {
        let store = MemoryStore::new();
        let replay = ReplayResult {
            records: vec![record(1, 1, 1), record(3, 2, 2)],
            valid_bytes: 0,
            discarded_bytes: 7,
        };

        let stats = replay_into(&store, &replay).unwrap();
        assert_eq!(stats.txns_replayed, 2);
        assert_eq!(stats.writes_applied, 2);
        assert_eq!(stats.final_version, Version::new(2));
        assert_eq!(stats.max_txn_id, 3);
        assert_eq!(stats.discarded_bytes, 7);

        let doc = store
            .get(&DocumentPath::new("counters", "20250513").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(doc.value.field("count"), Some(&Value::Int(2)));
        assert_eq!(doc.version, Version::new(2));
        assert_eq!(doc.timestamp, Timestamp::from_secs(1_747_094_402));
    }

    #[test]
    fn test_replay_rejects_version_regression() {
        let store = MemoryStore::new();
        let replay = ReplayResult {
            records: vec![record(1, 2, 1), record(2, 2, 2)],
            ..ReplayResult::default()
        };
        let err = replay_into(&store, &replay).unwrap_err();
        assert!(matches!(err, TallyError::Corruption { .. }));
    }
}
