//! Reconnect backoff policy.
//!
//! The delay doubles with each consecutive dial failure and is capped:
//! `delay(n) = min(max, initial * 2^n)`, where `n` counts failures since the
//! last successful dial. No jitter is applied.

use std::time::Duration;

use crate::constants::{BACKOFF_INITIAL, BACKOFF_MAX};

/// Delay for the `failures`-th consecutive failure (zero-based).
#[must_use]
pub fn backoff_delay(failures: u32, initial: Duration, max: Duration) -> Duration {
    let factor = 1u32.checked_shl(failures).unwrap_or(u32::MAX);
    initial.saturating_mul(factor).min(max)
}

/// Failure-streak tracker driving the supervisor's waits.
#[derive(Clone, Debug)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    failures: u32,
}

impl Backoff {
    /// New policy; `max` is raised to `initial` if given smaller.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            failures: 0,
        }
    }

    /// Delay to wait right now, without advancing the streak.
    pub fn current(&self) -> Duration {
        backoff_delay(self.failures, self.initial, self.max)
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a dial failure: returns the delay to wait and doubles the next one.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.current();
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Back to the initial delay after a successful dial.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_INITIAL, BACKOFF_MAX)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
