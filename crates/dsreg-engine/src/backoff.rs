//! # Retry Policy
//!
//! Exponential, capped, deterministic backoff. [`RetryPolicy::next_delay`]
//! is a pure function of the attempt count: no jitter, no clock, no state.
//!
//! For attempt `n` (1-based, the attempt that just failed):
//!
//! ```text
//! delay(n) = min(base * 2^(n-1), max)      if n <= max_attempts
//!          = Exhausted                     otherwise
//! ```

use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    RetryAfter(Duration),
    /// The retry budget is spent.
    Exhausted,
}

/// Capped exponential backoff with a fixed attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max: Duration,
}

impl RetryPolicy {
    /// Create a policy. `base` is clamped to `max`.
    pub fn new(max_attempts: u32, base: Duration, max: Duration) -> Self {
        Self {
            max_attempts,
            base: base.min(max),
            max,
        }
    }

    /// Attempts permitted per state.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether attempt number `attempt` (1-based) may be made.
    pub fn permits(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }

    /// The delay after attempt `attempt` failed, or `Exhausted` once
    /// `attempt` is past the budget.
    pub fn next_delay(&self, attempt: u32) -> RetryDecision {
        if !self.permits(attempt) {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.delay(attempt))
    }

    /// The capped exponential delay after attempt `attempt`, without
    /// consulting the budget.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(300))
    }
}
