//! Document addressing
//!
//! Every document in the store lives at a two-segment path:
//! `{collection}/{id}`, e.g. `counters/20250513` or `reports/20250513-0001`.
//!
//! ## Ordering
//!
//! Paths order by collection first, then by id (byte-wise). Collection scans
//! rely on this: all documents of one collection form a contiguous range.

use crate::error::{TallyError, TallyResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a single path segment in bytes
pub const MAX_SEGMENT_LENGTH: usize = 256;

/// Full path of a document: collection plus document id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath {
    collection: String,
    id: String,
}

impl DocumentPath {
    /// Create a document path, validating both segments
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a segment is empty, too long, or contains `/`.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> TallyResult<Self> {
        let collection = collection.into();
        let id = id.into();
        validate_segment("collection", &collection)?;
        validate_segment("document id", &id)?;
        Ok(DocumentPath { collection, id })
    }

    /// Lowest possible path of a collection, used as a range-scan start
    ///
    /// The returned path has an empty id and never names a real document.
    pub fn collection_floor(collection: impl Into<String>) -> Self {
        DocumentPath {
            collection: collection.into(),
            id: String::new(),
        }
    }

    /// Collection this document belongs to
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Document id within its collection
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Check if this document belongs to `collection`
    pub fn is_in(&self, collection: &str) -> bool {
        self.collection == collection
    }
}

fn validate_segment(what: &str, segment: &str) -> TallyResult<()> {
    if segment.is_empty() {
        return Err(TallyError::invalid_input(format!("{} must not be empty", what)));
    }
    if segment.len() > MAX_SEGMENT_LENGTH {
        return Err(TallyError::invalid_input(format!(
            "{} exceeds {} bytes",
            what, MAX_SEGMENT_LENGTH
        )));
    }
    if segment.contains('/') {
        return Err(TallyError::invalid_input(format!(
            "{} '{}' must not contain '/'",
            what, segment
        )));
    }
    Ok(())
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for DocumentPath {
    type Err = TallyError;

    fn from_str(s: &str) -> TallyResult<Self> {
        match s.split_once('/') {
            Some((collection, id)) => DocumentPath::new(collection, id),
            None => Err(TallyError::invalid_input(format!(
                "document path '{}' must have the form collection/id",
                s
            ))),
        }
    }
}
