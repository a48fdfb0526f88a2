//! Transaction configuration and retry logic
//!
//! Contains RetryConfig for transaction retry behavior.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Configuration for transaction retry behavior
///
/// A conflicted transaction is re-run from scratch against a fresh snapshot
/// after an exponential backoff of `base_delay_ms * 2^attempt`, capped at
/// `max_delay_ms`.
///
/// # Example
/// ```
/// use tally_engine::RetryConfig;
///
/// let config = RetryConfig::new()
///     .with_max_retries(5)
///     .with_base_delay_ms(10)
///     .with_max_delay_ms(200);
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default = "RetryConfig::contention")]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_retries: usize,
    /// Base delay between retries in milliseconds (exponential backoff)
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Create a new RetryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RetryConfig with no retries
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Policy for many writers hammering one document
    ///
    /// 200 retries, 1ms base delay, 50ms cap.
    pub fn contention() -> Self {
        Self {
            max_retries: 200,
            base_delay_ms: 1,
            max_delay_ms: 50,
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Total attempts this policy allows (first try plus retries)
    pub fn max_attempts(&self) -> usize {
        self.max_retries.saturating_add(1)
    }

    /// Calculate delay for a given attempt (exponential backoff)
    pub(crate) fn calculate_delay(&self, attempt: usize) -> Duration {
        // 1 << 63 is the largest shift a u64 takes
        let shift = attempt.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let config = RetryConfig::contention();
        assert_eq!(config.calculate_delay(0), Duration::from_millis(1));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(2));
        assert_eq!(config.calculate_delay(5), Duration::from_millis(32));
        assert_eq!(config.calculate_delay(6), Duration::from_millis(50));
        assert_eq!(config.calculate_delay(199), Duration::from_millis(50));
    }

    #[test]
    fn test_backoff_never_overflows() {
        let config = RetryConfig::new().with_base_delay_ms(u64::MAX).with_max_delay_ms(u64::MAX);
        assert_eq!(config.calculate_delay(usize::MAX), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_presets() {
        assert_eq!(RetryConfig::no_retry().max_attempts(), 1);
        assert_eq!(RetryConfig::default().max_attempts(), 4);
        assert_eq!(RetryConfig::contention().max_attempts(), 201);
    }
}
