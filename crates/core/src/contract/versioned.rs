//! Versioned wrapper type
//!
//! Every read returns data wrapped in `Versioned<T>`: the value, the commit
//! version that wrote it, and the commit timestamp.

use super::{Timestamp, Version};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A value tagged with the commit that wrote it
///
/// `version` and `timestamp` always come from the same commit record, both
/// on the live path and after replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// The actual value
    pub value: T,
    /// Commit version
    pub version: Version,
    /// Commit timestamp
    pub timestamp: Timestamp,
}

impl<T> Versioned<T> {
    /// Tag `value` with its commit version and time
    pub fn with_timestamp(value: T, version: Version, timestamp: Timestamp) -> Self {
        Versioned {
            value,
            version,
            timestamp,
        }
    }
}

/// A stored document with its version information
pub type VersionedValue = Versioned<Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versioned_serde_keeps_commit_metadata() {
        let ts = Timestamp::from_secs(5);
        let v = VersionedValue::with_timestamp(Value::Int(21), Version::new(3), ts);
        let json = serde_json::to_string(&v).unwrap();
        let back: VersionedValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert_eq!(back.version, Version::new(3));
        assert_eq!(back.timestamp, ts);
    }
}
