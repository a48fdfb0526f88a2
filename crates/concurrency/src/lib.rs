//! Concurrency layer for Tally
//!
//! This crate implements optimistic concurrency control (OCC) with:
//! - TransactionContext: read/write set tracking with read-your-writes
//! - Snapshot isolation over `SnapshotView`
//! - Read-set validation at commit time (first-committer-wins)
//! - TransactionManager: commit lock, version allocation, log-then-apply

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod manager;
pub mod transaction;
pub mod validation;

pub use manager::TransactionManager;
pub use transaction::{CommitError, PendingOperations, TransactionContext, TransactionStatus};
pub use validation::{validate_read_set, validate_transaction, ConflictType, ValidationResult};
