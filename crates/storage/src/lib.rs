//! Storage layer for tally
//!
//! This crate implements the in-memory document store:
//! - MemoryStore: BTreeMap-based storage behind a `parking_lot::RwLock`
//! - Global version tracking with AtomicU64
//! - ClonedSnapshotView: point-in-time reads for transactions

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod snapshot;

pub use memory::MemoryStore;
pub use snapshot::ClonedSnapshotView;
