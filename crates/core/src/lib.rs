//! Core types and traits for Tally
//!
//! This crate defines the foundational types used throughout the system:
//! - DocumentPath: `{collection}/{id}` document addressing
//! - Value: document value model
//! - Version / Timestamp / Versioned: commit metadata returned by reads
//! - TallyError: error type hierarchy
//! - Traits: Storage and SnapshotView

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod error;
pub mod traits;
pub mod types;
pub mod value;

pub use contract::{DateBasis, Timestamp, Version, Versioned, VersionedValue};
pub use error::{TallyError, TallyResult};
pub use traits::{SnapshotView, Storage};
pub use types::DocumentPath;
pub use value::{Fields, Value};
