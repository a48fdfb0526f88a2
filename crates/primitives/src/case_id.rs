//! Case identifier value types
//!
//! A case identifier is `{YYYYMMDD}-{NNNN}`: the calendar day the case was
//! opened and that day's sequence number, zero-padded to four digits.
//! Counts of 10000 and above widen instead of truncating, so
//! `20250513-10000` follows `20250513-9999`.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tally_core::{DateBasis, TallyError, TallyResult, Timestamp};

/// Minimum rendered width of the sequence number
pub const COUNT_WIDTH: usize = 4;

/// Calendar day in `YYYYMMDD` form
///
/// Always eight digits: years outside 0000..=9999 are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatePrefix(NaiveDate);

impl DatePrefix {
    /// Wrap a calendar date
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the year does not fit in four digits.
    pub fn new(date: NaiveDate) -> TallyResult<Self> {
        if !(0..=9999).contains(&date.year()) {
            return Err(TallyError::invalid_input(format!(
                "date {} has no 8-digit prefix",
                date
            )));
        }
        Ok(DatePrefix(date))
    }

    /// Day of `timestamp` in the given calendar
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if that day falls past year 9999.
    pub fn from_timestamp(timestamp: Timestamp, basis: DateBasis) -> TallyResult<Self> {
        Self::new(timestamp.calendar_date(basis))
    }

    /// Build from year, month, and day
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the date does not exist.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> TallyResult<Self> {
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            TallyError::invalid_input(format!("{:04}-{:02}-{:02} is not a date", year, month, day))
        })?;
        Self::new(date)
    }

    /// The calendar date
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The following day
    pub fn next_day(&self) -> Option<Self> {
        self.0.succ_opt().and_then(|d| Self::new(d).ok())
    }
}

impl fmt::Display for DatePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}{:02}{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

impl FromStr for DatePrefix {
    type Err = TallyError;

    fn from_str(s: &str) -> TallyResult<Self> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TallyError::invalid_input(format!(
                "date prefix '{}' is not 8 digits",
                s
            )));
        }
        let field = |range: std::ops::Range<usize>| -> TallyResult<u32> {
            s[range]
                .parse()
                .map_err(|e| TallyError::invalid_input(format!("date prefix '{}': {}", s, e)))
        };
        Self::from_ymd(field(0..4)? as i32, field(4..6)?, field(6..8)?)
    }
}

impl TryFrom<String> for DatePrefix {
    type Error = TallyError;

    fn try_from(s: String) -> TallyResult<Self> {
        s.parse()
    }
}

impl From<DatePrefix> for String {
    fn from(prefix: DatePrefix) -> Self {
        prefix.to_string()
    }
}

/// A case identifier, `{DatePrefix}-{count}`
///
/// Ordered by date, then by count, which is also the order the allocator
/// issues identifiers within a day.
///
/// # Example
///
/// ```
/// use tally_primitives::CaseId;
///
/// let id: CaseId = "20250513-0042".parse().unwrap();
/// assert_eq!(id.count(), 42);
/// assert_eq!(id.to_string(), "20250513-0042");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaseId {
    date: DatePrefix,
    count: u64,
}

impl CaseId {
    /// Build a case identifier
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero count; sequences start at 1.
    pub fn new(date: DatePrefix, count: u64) -> TallyResult<Self> {
        if count == 0 {
            return Err(TallyError::invalid_input("case ID count must be positive"));
        }
        Ok(CaseId { date, count })
    }

    /// Day the case was opened
    pub fn date(&self) -> DatePrefix {
        self.date
    }

    /// Sequence number within the day
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:0width$}", self.date, self.count, width = COUNT_WIDTH)
    }
}

impl FromStr for CaseId {
    type Err = TallyError;

    /// Parse the canonical form only: a real date, a positive count, at
    /// least four digits, and no extra leading zeros past four.
    fn from_str(s: &str) -> TallyResult<Self> {
        let invalid = |why: &str| TallyError::invalid_input(format!("case ID '{}': {}", s, why));

        let (date, count) = s
            .split_once('-')
            .ok_or_else(|| invalid("expected YYYYMMDD-NNNN"))?;
        let date: DatePrefix = date.parse()?;

        if count.len() < COUNT_WIDTH || !count.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("sequence must be at least 4 digits"));
        }
        if count.len() > COUNT_WIDTH && count.starts_with('0') {
            return Err(invalid("sequence has extra leading zeros"));
        }
        let count: u64 = count.parse().map_err(|_| invalid("sequence out of range"))?;

        CaseId::new(date, count)
    }
}

impl TryFrom<String> for CaseId {
    type Error = TallyError;

    fn try_from(s: String) -> TallyResult<Self> {
        s.parse()
    }
}

impl From<CaseId> for String {
    fn from(id: CaseId) -> Self {
        id.to_string()
    }
}
