//! Database engine for tally
//!
//! This crate orchestrates all lower layers:
//! - Database: Main database struct with open/close
//! - Transaction coordination and retry
//! - Commit log replay on open
//! - Configuration via `tally.toml`
//!
//! The engine is the only component that knows about:
//! - Cross-layer coordination (storage + commit log + replay)
//! - Which directory a database lives in

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coordinator;
pub mod database;
pub mod replay;

pub use coordinator::{ActiveTransaction, TransactionCoordinator, TransactionMetrics};
pub use database::{Database, RetryConfig, TallyConfig, CONFIG_FILE_NAME};
pub use replay::{replay_into, RecoveryStats};
