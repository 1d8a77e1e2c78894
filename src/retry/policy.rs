// Retry policy - bounded exponential backoff schedule

use rand::Rng;
use std::time::Duration;

/// Backoff schedule for a single call site.
///
/// `max_attempts` counts retries after the first try, so a policy with
/// `max_attempts = 3` runs the operation at most four times and
/// `max_attempts = 0` runs it exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Hard limit for a single attempt; an expired attempt counts as a failure
    pub attempt_timeout: Option<Duration>,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(30_000),
            backoff_factor: 2.0,
            attempt_timeout: None,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Default::default()
        }
    }

    /// Retries without sleeping in between
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Factors below 1.0 would shrink the delay, so they are clamped to 1.0
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total number of times the operation may run (first try + retries)
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// Delay slept after the `failed_attempt`-th attempt (1-based) fails:
    /// `min(initial_delay * backoff_factor^(failed_attempt - 1), max_delay)`
    pub fn delay_before_retry(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_factor.max(1.0);
        let initial_ms = self.initial_delay.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;

        let delay_ms = initial_ms * factor.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= max_ms {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms.round() as u64)
    }

    /// The full sleep schedule between attempts, one entry per retry
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_attempts).map(move |attempt| self.delay_before_retry(attempt))
    }

    /// Spreads the delay over `[delay / 2, delay]` when jitter is enabled
    pub(crate) fn jittered(&self, delay: Duration) -> Duration {
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let millis = delay.as_millis() as u64;
        let low = millis / 2;
        Duration::from_millis(rand::rng().random_range(low..=millis))
    }
}
