//! Tally - daily sequential case ID allocation
//!
//! Tally issues case identifiers of the form `YYYYMMDD-NNNN`: the calendar
//! day the case was opened and that day's sequence number. Each day has its
//! own counter document, and every increment runs as an optimistic
//! transaction, so concurrent callers never receive the same identifier
//! and a day's sequence has no gaps.
//!
//! # Quick Start
//!
//! ```
//! use tally::{CaseIdAllocator, Database, DatePrefix};
//!
//! let db = Database::ephemeral()?;
//! let allocator = CaseIdAllocator::new(db);
//!
//! let day = DatePrefix::from_ymd(2025, 5, 13)?;
//! assert_eq!(allocator.allocate_for(day)?.to_string(), "20250513-0001");
//! assert_eq!(allocator.allocate_for(day)?.to_string(), "20250513-0002");
//! # Ok::<(), tally::TallyError>(())
//! ```
//!
//! # Architecture
//!
//! Storage, the commit log, and transaction validation live in their own
//! crates; only the database handle, the allocator, and the report store
//! are re-exported here.

pub use tally_concurrency::TransactionContext;
pub use tally_core::{
    DateBasis, DocumentPath, Fields, TallyError, TallyResult, Timestamp, Value, Version,
    VersionedValue,
};
pub use tally_durability::DurabilityMode;
pub use tally_engine::{
    ActiveTransaction, Database, RetryConfig, TallyConfig, TransactionMetrics, CONFIG_FILE_NAME,
};
pub use tally_primitives::*;
