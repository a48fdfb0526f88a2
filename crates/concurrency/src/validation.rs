//! Transaction validation for OCC
//!
//! Rules:
//! - First-committer-wins based on the READ-SET, not the write-set
//! - Blind writes (write without read) do NOT conflict
//! - Write skew is allowed

use std::collections::HashMap;

use tally_core::{DocumentPath, Storage, TallyError, TallyResult, Version};

use crate::transaction::TransactionContext;

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A document was read at one version but storage now holds another
    ///
    /// Covers creation (read at 0, now present), update, and deletion
    /// (read present, now 0).
    ReadWriteConflict {
        /// The document that changed
        path: DocumentPath,
        /// Version recorded in read_set when read
        read_version: Version,
        /// Current version in storage at validation time
        current_version: Version,
    },
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictType::ReadWriteConflict {
                path,
                read_version,
                current_version,
            } => write!(
                f,
                "{} read at {} but is now at {}",
                path, read_version, current_version
            ),
        }
    }
}

/// Result of transaction validation
///
/// A transaction commits only if `is_valid()` is true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// A successful validation result
    pub fn ok() -> Self {
        Self::default()
    }

    /// A validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// One-line summary naming the first conflicting document
    pub fn describe(&self) -> String {
        match self.conflicts.first() {
            None => "no conflicts".to_string(),
            Some(first) if self.conflicts.len() == 1 => first.to_string(),
            Some(first) => format!("{} (and {} more)", first, self.conflicts.len() - 1),
        }
    }
}

/// Validate a read set against current storage state
///
/// Every document whose current version differs from the version it was
/// read at is reported as a `ReadWriteConflict`. Absent documents are
/// version 0 on both sides.
///
/// # Errors
///
/// Returns an error if storage cannot be read; the caller must not commit.
pub fn validate_read_set<S: Storage + ?Sized>(
    read_set: &HashMap<DocumentPath, Version>,
    store: &S,
) -> TallyResult<ValidationResult> {
    let mut result = ValidationResult::ok();

    for (path, read_version) in read_set {
        let current_version = store
            .get(path)
            .map_err(|e| {
                TallyError::internal(format!(
                    "storage error during read-set validation for {}: {}",
                    path, e
                ))
            })?
            .map(|vv| vv.version)
            .unwrap_or(Version::ZERO);

        if current_version != *read_version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                path: path.clone(),
                read_version: *read_version,
                current_version,
            });
        }
    }

    Ok(result)
}

/// Validate a whole transaction
///
/// Read-only transactions validate too: a conflicting read-only
/// transaction reports the conflict instead of returning stale data as
/// committed.
///
/// # Errors
///
/// Returns an error if storage cannot be read.
pub fn validate_transaction<S: Storage + ?Sized>(
    txn: &TransactionContext,
    store: &S,
) -> TallyResult<ValidationResult> {
    validate_read_set(&txn.read_set, store)
}
