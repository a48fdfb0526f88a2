//! Contract types shared by every layer
//!
//! - `version`: commit versions
//! - `timestamp`: microsecond timestamps with chrono conversions
//! - `versioned`: value + version + timestamp wrapper returned by reads

pub mod timestamp;
pub mod version;
pub mod versioned;

pub use timestamp::{DateBasis, Timestamp};
pub use version::Version;
pub use versioned::{Versioned, VersionedValue};
