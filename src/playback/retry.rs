//! Bounded exponential backoff.
//!
//! A `RetryHandler` is a plain counter shared by every recovery path in the
//! engine. It performs no scheduling itself; callers ask it whether another
//! attempt is allowed and how long to wait before making it.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upper bound applied to every backoff delay unless overridden.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_millis(16_000);

/// Snapshot of a handler's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// Number of retries allowed before the failure is terminal.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Retries consumed so far.
    pub retry_count: u32,
}

/// Bounded exponential-backoff counter.
///
/// Invariant: `0 <= retry_count <= max_retries`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryHandler {
    /// Number of retries allowed before the failure is terminal.
    max_retries: u32,
    /// Delay before the first retry.
    base_delay: Duration,
    /// Cap applied to the computed delay.
    max_delay: Duration,
    /// Retries consumed so far.
    retry_count: u32,
}

impl RetryHandler {
    /// Creates a handler capped at [`DEFAULT_MAX_BACKOFF`].
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Number of retries allowed.
    /// * `base_delay` - Delay before the first retry.
    ///
    /// # Returns
    ///
    /// A new `RetryHandler` with `retry_count == 0`.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: DEFAULT_MAX_BACKOFF,
            retry_count: 0,
        }
    }

    /// Overrides the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Returns `true` while another retry is allowed.
    #[must_use]
    pub fn should_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Consumes one retry. Does nothing once the budget is spent.
    pub fn increment_retry(&mut self) {
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
        }
    }

    /// Delay to wait before the next retry: `base * 2^retry_count`, capped.
    #[must_use]
    pub fn get_delay(&self) -> Duration {
        let factor = 1u32.checked_shl(self.retry_count).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
            .min(self.max_delay)
    }

    /// Retries consumed so far.
    #[must_use]
    pub fn get_retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Clears the counter after a successful load or play.
    pub fn reset(&mut self) {
        self.retry_count = 0;
    }

    /// Returns the current counters.
    #[must_use]
    pub fn state(&self) -> RetryState {
        RetryState {
            max_retries: self.max_retries,
            base_delay_ms: u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX),
            retry_count: self.retry_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::playback::retry::{DEFAULT_MAX_BACKOFF, RetryHandler};

    #[test]
    fn test_delay_doubles_per_retry() {
        let mut retry = RetryHandler::new(5, Duration::from_millis(1000));

        let mut delays = Vec::new();
        while retry.should_retry() {
            delays.push(retry.get_delay().as_millis());
            retry.increment_retry();
        }

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_delay_is_capped_and_non_decreasing() {
        let mut retry = RetryHandler::new(40, Duration::from_millis(750))
            .with_max_delay(Duration::from_secs(5));

        let mut previous = Duration::ZERO;
        for _ in 0..40 {
            let delay = retry.get_delay();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(5));
            previous = delay;
            retry.increment_retry();
        }
        assert_eq!(previous, Duration::from_secs(5));
    }

    #[test]
    fn test_large_retry_count_does_not_overflow() {
        let mut retry = RetryHandler::new(u32::MAX, Duration::from_secs(1));
        for _ in 0..64 {
            retry.increment_retry();
        }
        assert_eq!(retry.get_delay(), DEFAULT_MAX_BACKOFF);
    }

    #[test]
    fn test_should_retry_bound() {
        let mut retry = RetryHandler::new(3, Duration::from_millis(100));
        for _ in 0..3 {
            assert!(retry.should_retry());
            retry.increment_retry();
        }
        assert!(!retry.should_retry());

        // Past the bound the counter stays put.
        retry.increment_retry();
        assert_eq!(retry.get_retry_count(), 3);
    }

    #[test]
    fn test_reset_clears_counter() {
        let mut retry = RetryHandler::new(2, Duration::from_millis(500));
        retry.increment_retry();
        retry.increment_retry();
        assert!(!retry.should_retry());

        retry.reset();

        assert_eq!(retry.get_retry_count(), 0);
        assert!(retry.should_retry());
        assert_eq!(retry.get_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_budget_never_retries() {
        let retry = RetryHandler::new(0, Duration::from_millis(500));
        assert!(!retry.should_retry());
        assert_eq!(retry.state().retry_count, 0);
    }
}
