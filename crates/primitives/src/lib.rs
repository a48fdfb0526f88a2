//! Primitives layer for tally
//!
//! Stateless facades over the Database engine:
//! - **CaseIdAllocator**: daily sequential `YYYYMMDD-NNNN` case identifiers
//! - **ReportStore**: case reports keyed by their case identifier
//!
//! ## Design Principle: Stateless Facades
//!
//! Facades hold only an `Arc<Database>` (plus a clock) and delegate every
//! operation to the transactional engine. This means:
//!
//! - Multiple facades on the same Database are safe
//! - All shared state lives in documents, never in process memory
//! - Replaying the commit log reproduces exactly what they observed

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod case_id;
pub mod clock;
pub mod report;

pub use allocator::{count_of, counter_path, CaseIdAllocator, COUNTERS_COLLECTION, COUNT_FIELD};
pub use case_id::{CaseId, DatePrefix, COUNT_WIDTH};
pub use clock::{Clock, FixedClock, SystemClock};
pub use report::{
    report_path, Location, NewReport, Report, ReportStatus, ReportStore, Volunteer,
    REPORTS_COLLECTION,
};
