//! Retry policy for outbound deliveries.

use std::time::Duration;

use rand::Rng;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Same delay before every retry.
    Fixed,
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    #[default]
    Exponential,
}

/// Bounded retry policy.
///
/// `max_attempts` counts every attempt, the first one included. A delivery
/// that failed its `max_attempts`-th attempt is dead-lettered.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Fraction of the delay (0.0-1.0) used as jitter amplitude.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between attempts, no jitter.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter: 0.1,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Nominal delay after the given failed attempt (1-indexed), before jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 1u32
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                self.base_delay
                    .checked_mul(factor)
                    .map_or(self.max_delay, |delay| delay.min(self.max_delay))
            }
        }
    }

    /// Delay before retrying after the given failed attempt (1-indexed).
    ///
    /// Drawn uniformly from `backoff ± jitter * backoff`, never above
    /// `max_delay` (or the backoff itself, when that is larger).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let nominal = self.backoff(attempt);
        if self.jitter.is_nan() || self.jitter <= 0.0 || nominal.is_zero() {
            return nominal;
        }

        let spread = nominal.mul_f64(self.jitter.min(1.0));
        let low = nominal.saturating_sub(spread);
        let high = nominal
            .saturating_add(spread)
            .min(self.max_delay.max(nominal));
        rand::thread_rng().gen_range(low..=high)
    }

    /// Whether another attempt is allowed after `attempt` attempts were made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
