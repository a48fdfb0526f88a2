//! CaseIdAllocator: daily sequential case identifiers
//!
//! ## Design
//!
//! Each calendar day has one counter document, `counters/{YYYYMMDD}`, whose
//! `count` field holds the last sequence number issued that day. Allocation
//! is a read-modify-write transaction on that one document:
//!
//! 1. Read the counter (absent means 0)
//! 2. Write back `count + 1`
//! 3. Commit; on conflict, re-run against a fresh snapshot
//!
//! Read-set validation lets exactly one of any set of racing transactions
//! commit per counter version, so every issued number is unique and the
//! sequence has no gaps. There is no in-process counter; the document is
//! the only source of truth.
//!
//! Counter documents are never deleted. They double as a record of daily
//! case volume (see [`CaseIdAllocator::daily_counts`]).
//!
//! ## Retry Closure
//!
//! The transaction closure may run many times under contention. It reads
//! and writes only through the transaction.

use std::cell::Cell;
use std::sync::Arc;

use tally_concurrency::TransactionContext;
use tally_core::{DateBasis, DocumentPath, TallyError, TallyResult, Timestamp, Value};
use tally_engine::{Database, RetryConfig};
use tracing::{debug, warn};

use crate::case_id::{CaseId, DatePrefix};
use crate::clock::{Clock, SystemClock};

/// Collection holding one counter document per day
pub const COUNTERS_COLLECTION: &str = "counters";

/// Field of a counter document holding the last issued number
pub const COUNT_FIELD: &str = "count";

/// Path of the counter document for `date`
pub fn counter_path(date: DatePrefix) -> TallyResult<DocumentPath> {
    DocumentPath::new(COUNTERS_COLLECTION, date.to_string())
}

/// Interpret a counter document
///
/// Missing, negative, and non-numeric counts read as 0, so a malformed
/// counter heals on its next allocation.
pub fn count_of(document: Option<&Value>) -> u64 {
    match document.and_then(|doc| doc.field(COUNT_FIELD)) {
        Some(Value::Int(n)) if *n > 0 => *n as u64,
        Some(Value::Float(f)) if f.is_finite() && *f >= 1.0 => f.min(i64::MAX as f64) as u64,
        _ => 0,
    }
}

/// Issues `YYYYMMDD-NNNN` case identifiers
///
/// Cheap to clone; clones share the database and clock.
///
/// # Example
///
/// ```
/// use tally_core::Timestamp;
/// use tally_engine::Database;
/// use tally_primitives::CaseIdAllocator;
///
/// let db = Database::ephemeral().unwrap();
/// let allocator = CaseIdAllocator::new(db);
///
/// // 2025-05-13T00:00:00Z
/// let now = Timestamp::from_secs(1_747_094_400);
/// assert_eq!(allocator.allocate(now).unwrap().to_string(), "20250513-0001");
/// assert_eq!(allocator.allocate(now).unwrap().to_string(), "20250513-0002");
/// ```
#[derive(Debug, Clone)]
pub struct CaseIdAllocator {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    date_basis: DateBasis,
}

impl CaseIdAllocator {
    /// Allocator using the system clock and the database's configured
    /// retry policy and date basis
    pub fn new(db: Arc<Database>) -> Self {
        let retry = db.retry_config().clone();
        let date_basis = db.date_basis();
        Self {
            db,
            clock: Arc::new(SystemClock),
            retry,
            date_basis,
        }
    }

    /// Replace the clock used by [`CaseIdAllocator::allocate_now`]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the calendar used to pick the day
    pub fn with_date_basis(mut self, date_basis: DateBasis) -> Self {
        self.date_basis = date_basis;
        self
    }

    /// Get the underlying database reference
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Calendar used to pick the day
    pub fn date_basis(&self) -> DateBasis {
        self.date_basis
    }

    /// Current time according to the allocator's clock
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Allocate the next case identifier for the day containing `now`
    ///
    /// `now` is trusted as given; only its calendar day matters.
    ///
    /// # Errors
    ///
    /// `AllocationFailed` if the retry budget ran out or the commit failed.
    /// The counter is unchanged in that case.
    pub fn allocate(&self, now: Timestamp) -> TallyResult<CaseId> {
        let date = DatePrefix::from_timestamp(now, self.date_basis)?;
        self.allocate_for(date)
    }

    /// Allocate using the allocator's clock
    ///
    /// # Errors
    ///
    /// Same as [`CaseIdAllocator::allocate`].
    pub fn allocate_now(&self) -> TallyResult<CaseId> {
        self.allocate(self.clock.now())
    }

    /// Allocate the next case identifier for `date`
    ///
    /// # Errors
    ///
    /// Same as [`CaseIdAllocator::allocate`].
    pub fn allocate_for(&self, date: DatePrefix) -> TallyResult<CaseId> {
        let path = counter_path(date)?;
        let attempts = Cell::new(0usize);

        let result = self.db.transaction_with_retry(&self.retry, |txn| {
            attempts.set(attempts.get() + 1);
            increment_counter(txn, &path)
        });

        match result {
            Ok(count) => {
                let id = CaseId::new(date, count)?;
                debug!(
                    target: "tally::alloc",
                    case_id = %id,
                    attempts = attempts.get(),
                    "Case ID allocated"
                );
                Ok(id)
            }
            Err(source) => {
                warn!(
                    target: "tally::alloc",
                    date_prefix = %date,
                    attempts = attempts.get(),
                    error = %source,
                    "Case ID allocation failed"
                );
                Err(TallyError::AllocationFailed {
                    date_prefix: date.to_string(),
                    attempts: attempts.get(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Last number issued for `date` (0 if none)
    ///
    /// Reads the latest committed counter without a transaction.
    pub fn current_count(&self, date: DatePrefix) -> TallyResult<u64> {
        let doc = self.db.get_document(&counter_path(date)?)?;
        Ok(count_of(doc.as_ref().map(|vv| &vv.value)))
    }

    /// Every day that has issued at least one identifier, with its count,
    /// oldest first
    pub fn daily_counts(&self) -> TallyResult<Vec<(DatePrefix, u64)>> {
        let mut counts = Vec::new();
        for (path, doc) in self.db.scan_collection(COUNTERS_COLLECTION)? {
            match path.id().parse::<DatePrefix>() {
                Ok(date) => counts.push((date, count_of(Some(&doc.value)))),
                Err(e) => {
                    debug!(
                        target: "tally::alloc",
                        path = %path,
                        error = %e,
                        "Skipping non-date counter"
                    );
                }
            }
        }
        counts.sort_by_key(|(date, _)| *date);
        Ok(counts)
    }
}

/// Bump the counter at `path` inside `txn`, returning the new count
///
/// Other fields of an existing counter document are kept.
fn increment_counter(txn: &mut TransactionContext, path: &DocumentPath) -> TallyResult<u64> {
    let existing = txn.get(path)?;
    let next = count_of(existing.as_ref())
        .checked_add(1)
        .filter(|n| *n <= i64::MAX as u64)
        .ok_or_else(|| TallyError::internal(format!("counter {} is exhausted", path)))?;

    let document = existing
        .unwrap_or_else(Value::object)
        .with_field(COUNT_FIELD, next as i64);
    txn.put(path.clone(), document)?;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use std::time::Duration;

    // 2025-05-13T00:00:00Z
    const MAY_13: u64 = 1_747_094_400;

    fn allocator() -> CaseIdAllocator {
        CaseIdAllocator::new(Database::ephemeral().unwrap())
    }

    fn day(s: &str) -> DatePrefix {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_allocation_creates_counter() {
        let alloc = allocator();
        let date = day("20250513");
        assert_eq!(alloc.current_count(date).unwrap(), 0);

        let id = alloc.allocate(Timestamp::from_secs(MAY_13)).unwrap();
        assert_eq!(id.to_string(), "20250513-0001");
        assert_eq!(alloc.current_count(date).unwrap(), 1);
    }

    #[test]
    fn test_sequential_allocations() {
        let alloc = allocator();
        let ids: Vec<String> = (0..3)
            .map(|_| alloc.allocate(Timestamp::from_secs(MAY_13 + 3600)).unwrap().to_string())
            .collect();
        assert_eq!(ids, ["20250513-0001", "20250513-0002", "20250513-0003"]);
    }

    #[test]
    fn test_allocate_now_uses_clock() {
        let clock = Arc::new(FixedClock::new(Timestamp::from_secs(MAY_13)));
        let alloc = allocator().with_clock(clock.clone());

        assert_eq!(alloc.allocate_now().unwrap().to_string(), "20250513-0001");
        clock.advance(Duration::from_secs(86_400));
        assert_eq!(alloc.allocate_now().unwrap().to_string(), "20250514-0001");
    }

    #[test]
    fn test_malformed_counter_reads_as_zero() {
        assert_eq!(count_of(None), 0);
        assert_eq!(count_of(Some(&Value::object())), 0);
        assert_eq!(count_of(Some(&Value::Int(5))), 0);
        assert_eq!(count_of(Some(&Value::object().with_field("count", -3i64))), 0);
        assert_eq!(count_of(Some(&Value::object().with_field("count", "7"))), 0);
        assert_eq!(count_of(Some(&Value::object().with_field("count", 7.0))), 7);
        assert_eq!(count_of(Some(&Value::object().with_field("count", f64::NAN))), 0);
        assert_eq!(count_of(Some(&Value::object().with_field("count", 7i64))), 7);
    }

    #[test]
    fn test_malformed_counter_heals_and_keeps_other_fields() {
        let alloc = allocator();
        let date = day("20250513");
        let path = counter_path(date).unwrap();
        alloc
            .database()
            .transaction(|txn| {
                txn.put(
                    path.clone(),
                    Value::object()
                        .with_field("count", "garbage")
                        .with_field("note", "migrated"),
                )
            })
            .unwrap();

        assert_eq!(alloc.allocate_for(date).unwrap().count(), 1);

        let doc = alloc.database().get_document(&path).unwrap().unwrap();
        assert_eq!(doc.value.field("count"), Some(&Value::Int(1)));
        assert_eq!(doc.value.field("note"), Some(&Value::from("migrated")));
    }

    #[test]
    fn test_daily_counts_sorted_and_skip_foreign_ids() {
        let alloc = allocator();
        alloc.allocate_for(day("20250514")).unwrap();
        alloc.allocate_for(day("20250513")).unwrap();
        alloc.allocate_for(day("20250513")).unwrap();
        alloc
            .database()
            .transaction(|txn| {
                txn.put(
                    DocumentPath::new(COUNTERS_COLLECTION, "legacy").unwrap(),
                    Value::object().with_field("count", 9i64),
                )
            })
            .unwrap();

        assert_eq!(
            alloc.daily_counts().unwrap(),
            vec![(day("20250513"), 2), (day("20250514"), 1)]
        );
    }

    #[test]
    fn test_exhausted_counter_fails_without_change() {
        let alloc = allocator();
        let date = day("20250513");
        let path = counter_path(date).unwrap();
        alloc
            .database()
            .transaction(|txn| txn.put(path.clone(), Value::object().with_field("count", i64::MAX)))
            .unwrap();

        let err = alloc.allocate_for(date).unwrap_err();
        match err {
            TallyError::AllocationFailed {
                date_prefix,
                attempts,
                ..
            } => {
                assert_eq!(date_prefix, "20250513");
                assert_eq!(attempts, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(alloc.current_count(date).unwrap(), i64::MAX as u64);
    }

    #[test]
    fn test_closed_database_reports_allocation_failure() {
        let alloc = allocator();
        alloc.database().shutdown().unwrap();

        let err = alloc.allocate_for(day("20250513")).unwrap_err();
        assert!(!err.is_conflict());
        assert!(!err.is_retryable());
        assert!(matches!(err, TallyError::AllocationFailed { attempts: 0, .. }));
    }
}
