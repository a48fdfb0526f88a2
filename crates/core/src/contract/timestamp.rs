//! Microsecond-precision timestamp type
//!
//! Timestamps are stored as microseconds since Unix epoch (1970-01-01 00:00:00 UTC).
//! Calendar conversions go through `chrono`.
//!
//! ```
//! use tally_core::Timestamp;
//!
//! let from_secs = Timestamp::from_secs(1_747_094_400);
//! assert_eq!(from_secs.to_utc().format("%Y%m%d").to_string(), "20250513");
//! ```

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::TallyError;

/// Time zone a timestamp's calendar date is read in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateBasis {
    /// Coordinated Universal Time
    #[default]
    Utc,
    /// The host's local time zone
    Local,
}

impl DateBasis {
    /// Lowercase name used in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            DateBasis::Utc => "utc",
            DateBasis::Local => "local",
        }
    }
}

impl std::fmt::Display for DateBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateBasis {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utc" => Ok(DateBasis::Utc),
            "local" => Ok(DateBasis::Local),
            other => Err(TallyError::invalid_input(format!(
                "invalid date basis '{}', expected \"utc\" or \"local\"",
                other
            ))),
        }
    }
}

/// Microsecond-precision timestamp
///
/// ## Invariants
///
/// - Timestamps are always non-negative (u64)
/// - The zero timestamp represents Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC)
    pub const EPOCH: Timestamp = Timestamp(0);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a timestamp for the current moment
    ///
    /// Uses system time. Returns epoch if the system clock is before Unix epoch.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as u64)
    }

    /// Create a timestamp from microseconds since epoch
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Create a timestamp from milliseconds since epoch
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis.saturating_mul(1_000))
    }

    /// Create a timestamp from seconds since epoch
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// Create a timestamp from a chrono UTC datetime
    ///
    /// Instants before the epoch clamp to `EPOCH`.
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Timestamp(dt.timestamp_micros().max(0) as u64)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Get microseconds since Unix epoch
    #[inline]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Get milliseconds since Unix epoch (truncates)
    #[inline]
    pub const fn as_millis(&self) -> u64 {
        self.0 / 1_000
    }

    /// Get seconds since Unix epoch (truncates)
    #[inline]
    pub const fn as_secs(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Convert to a chrono UTC datetime
    pub fn to_utc(&self) -> DateTime<Utc> {
        // u64 micros only leave chrono's range far beyond year 262143
        Utc.timestamp_micros(self.0.min(i64::MAX as u64) as i64)
            .single()
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Calendar date of this instant in the given time zone
    pub fn calendar_date(&self, basis: DateBasis) -> NaiveDate {
        match basis {
            DateBasis::Utc => self.to_utc().date_naive(),
            DateBasis::Local => self.to_utc().with_timezone(&Local).date_naive(),
        }
    }

    /// Compute duration since an earlier timestamp
    ///
    /// Returns `None` if `earlier` is actually later than `self`.
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_micros)
    }

    /// Add a duration to this timestamp, saturating on overflow
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.as_micros() as u64))
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::EPOCH
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_utc().to_rfc3339())
    }
}

impl From<u64> for Timestamp {
    /// Create from raw microseconds
    fn from(micros: u64) -> Self {
        Timestamp::from_micros(micros)
    }
}

impl From<Timestamp> for u64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::from_datetime(&dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_epoch() {
        assert_eq!(Timestamp::EPOCH.as_micros(), 0);
        assert_eq!(Timestamp::EPOCH.as_secs(), 0);
        assert_eq!(Timestamp::default(), Timestamp::EPOCH);
    }

    #[test]
    fn test_timestamp_unit_conversions() {
        let ts = Timestamp::from_secs(2);
        assert_eq!(ts.as_millis(), 2_000);
        assert_eq!(ts.as_micros(), 2_000_000);
        assert_eq!(Timestamp::from_millis(1_500).as_micros(), 1_500_000);
    }

    #[test]
    fn test_timestamp_now_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(Timestamp::now().as_secs() > 1_577_836_800);
    }

    #[test]
    fn test_timestamp_chrono_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2025, 5, 13, 23, 59, 59).unwrap();
        let ts = Timestamp::from(dt);
        assert_eq!(ts.to_utc(), dt);
        assert_eq!(ts.to_string(), "2025-05-13T23:59:59+00:00");
    }

    #[test]
    fn test_timestamp_pre_epoch_clamps() {
        let dt = Utc.with_ymd_and_hms(1969, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(Timestamp::from(dt), Timestamp::EPOCH);
    }

    #[test]
    fn test_calendar_date_utc() {
        // 2025-05-13T23:59:59Z is still the 13th in UTC
        let ts = Timestamp::from_secs(1_747_180_799);
        assert_eq!(
            ts.calendar_date(DateBasis::Utc),
            NaiveDate::from_ymd_opt(2025, 5, 13).unwrap()
        );
        let next = Timestamp::from_secs(1_747_180_800);
        assert_eq!(
            next.calendar_date(DateBasis::Utc),
            NaiveDate::from_ymd_opt(2025, 5, 14).unwrap()
        );
    }

    #[test]
    fn test_date_basis_parse() {
        assert_eq!("utc".parse::<DateBasis>().unwrap(), DateBasis::Utc);
        assert_eq!("LOCAL".parse::<DateBasis>().unwrap(), DateBasis::Local);
        assert!("tokyo".parse::<DateBasis>().is_err());
        assert_eq!(DateBasis::default().to_string(), "utc");
    }

    #[test]
    fn test_duration_since() {
        let a = Timestamp::from_secs(10);
        let b = Timestamp::from_secs(12);
        assert_eq!(b.duration_since(a), Some(Duration::from_secs(2)));
        assert_eq!(a.duration_since(b), None);
        assert_eq!(a.saturating_add(Duration::from_secs(2)), b);
    }
}
