//! Commit record: one committed transaction's write set

use serde::{Deserialize, Serialize};
use tally_core::{DocumentPath, Timestamp, Value, Version};

/// A committed transaction as written to the commit log
///
/// A record is only written after validation succeeded, so replay applies
/// every complete record unconditionally, in log order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Transaction identifier
    pub txn_id: u64,
    /// Commit version shared by every write in the record
    pub version: Version,
    /// Commit timestamp
    pub timestamp: Timestamp,
    /// Documents written
    pub writes: Vec<(DocumentPath, Value)>,
    /// Documents deleted
    pub deletes: Vec<DocumentPath>,
}

impl CommitRecord {
    /// Total number of document mutations in the record
    pub fn mutation_count(&self) -> usize {
        self.writes.len() + self.deletes.len()
    }
}
