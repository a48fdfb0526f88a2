//! Time sources for case ID allocation
//!
//! The allocator only needs "now" to pick a calendar day, so the clock is
//! injected. Production uses [`SystemClock`]; tests pin the day with
//! [`FixedClock`].

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tally_core::Timestamp;

/// Source of the current time
pub trait Clock: Send + Sync + Debug {
    /// Current instant
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that returns a settable instant
#[derive(Debug, Default)]
pub struct FixedClock {
    micros: AtomicU64,
}

impl FixedClock {
    /// Clock stopped at `at`
    pub fn new(at: Timestamp) -> Self {
        FixedClock {
            micros: AtomicU64::new(at.as_micros()),
        }
    }

    /// Move the clock to `at`
    pub fn set(&self, at: Timestamp) {
        self.micros.store(at.as_micros(), Ordering::SeqCst);
    }

    /// Move the clock forward
    ///
    /// Saturates at the largest representable timestamp.
    pub fn advance(&self, by: Duration) {
        let by = by.as_micros().min(u64::MAX as u128) as u64;
        // The closure never returns None, so the update cannot fail
        self.micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |m| {
                Some(m.saturating_add(by))
            })
            .ok();
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_micros(self.micros.load(Ordering::SeqCst))
    }
}
