//! Durability layer for Tally
//!
//! This crate handles everything that touches disk:
//!
//! - Commit log: append-only file with one frame per committed transaction
//! - Durability modes: Always, Standard (default), Cache
//! - Replay on open, with torn-tail truncation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commit_log;
pub mod encoding;
pub mod mode;
pub mod record;

pub use commit_log::{CommitLog, ReplayResult, COMMIT_LOG_FILE_NAME};
pub use encoding::{decode_record, encode_record, DecodeError};
pub use mode::DurabilityMode;
pub use record::CommitRecord;
