//! Error types for the tally document store
//!
//! This module defines the error hierarchy shared by every layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Classification
//!
//! - **Conflict** errors (`TransactionConflict`, `AllocationFailed`) mean the
//!   operation lost an optimistic-concurrency race. The engine retries
//!   conflicts internally; once the retry budget is spent they reach the caller.
//! - **Retryable** errors are conflicts plus transient storage failures.
//! - Everything else is a caller bug or a corrupted store.

use crate::types::DocumentPath;
use std::io;
use thiserror::Error;

/// Result type alias for tally operations
pub type TallyResult<T> = std::result::Result<T, TallyError>;

/// Error types for the tally document store
#[derive(Debug, Error)]
pub enum TallyError {
    /// I/O error (commit log, config file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// What failed to encode or decode
        message: String,
    },

    /// Document not found where one was required
    #[error("Document not found: {path}")]
    NotFound {
        /// Path of the missing document
        path: DocumentPath,
    },

    /// Read-set validation failed at commit time
    #[error("Transaction conflict: {reason}")]
    TransactionConflict {
        /// Human-readable description of the conflicting read
        reason: String,
    },

    /// Transaction was aborted by its own closure or by an invalid operation
    #[error("Transaction aborted: {reason}")]
    TransactionAborted {
        /// Why the transaction was aborted
        reason: String,
    },

    /// Operation attempted on a transaction that is no longer active
    #[error("Transaction not active (state: {state})")]
    TransactionNotActive {
        /// Current transaction state
        state: String,
    },

    /// A case identifier could not be allocated
    ///
    /// Raised when the counter transaction exhausted its retry budget or the
    /// store refused the commit. The counter is unchanged when this is returned.
    #[error("Case ID allocation failed for {date_prefix} after {attempts} attempt(s): {source}")]
    AllocationFailed {
        /// Day the allocation was for (`YYYYMMDD`)
        date_prefix: String,
        /// Number of transaction attempts made
        attempts: usize,
        /// Underlying failure
        #[source]
        source: Box<TallyError>,
    },

    /// Invalid input supplied by the caller
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input
        message: String,
    },

    /// Storage layer error
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure
        message: String,
    },

    /// Data corruption detected (commit log CRC mismatch, undecodable record)
    #[error("Data corruption: {message}")]
    Corruption {
        /// Description of the corruption
        message: String,
    },

    /// Database is shutting down and no longer accepts transactions
    #[error("Database is closed")]
    Closed,

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the violated invariant
        message: String,
    },
}

impl TallyError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        TallyError::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TallyError::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        TallyError::Storage {
            message: message.into(),
        }
    }

    /// Create a corruption error
    pub fn corruption(message: impl Into<String>) -> Self {
        TallyError::Corruption {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        TallyError::Serialization {
            message: message.into(),
        }
    }

    /// Create a transaction conflict error
    pub fn conflict(reason: impl Into<String>) -> Self {
        TallyError::TransactionConflict {
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(path: DocumentPath) -> Self {
        TallyError::NotFound { path }
    }

    /// Check whether this error is a lost optimistic-concurrency race
    ///
    /// An `AllocationFailed` is a conflict only when the failure it wraps is.
    pub fn is_conflict(&self) -> bool {
        match self {
            TallyError::TransactionConflict { .. } => true,
            TallyError::AllocationFailed { source, .. } => source.is_conflict(),
            _ => false,
        }
    }

    /// Check whether retrying the whole operation could succeed
    ///
    /// Conflicts and I/O/storage hiccups are retryable. Invalid input,
    /// corruption, and closed databases are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TallyError::TransactionConflict { .. }
            | TallyError::Io(_)
            | TallyError::Storage { .. } => true,
            TallyError::AllocationFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for TallyError {
    fn from(e: serde_json::Error) -> Self {
        TallyError::serialization(e.to_string())
    }
}
