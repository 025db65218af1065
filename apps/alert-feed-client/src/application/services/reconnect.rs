//! Reconnection Policy
//!
//! Computes the delay before each reconnect attempt. The default is a
//! fixed delay with unlimited attempts; exponential backoff with jitter is
//! available as an opt-in strategy.

use std::time::Duration;

use rand::Rng;

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How the delay evolves across consecutive failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ReconnectStrategy {
    /// Same delay for every attempt.
    #[default]
    Fixed,
    /// Delay multiplied after every attempt, capped, with jitter.
    Exponential {
        /// Maximum delay between attempts.
        max_delay: Duration,
        /// Multiplier applied after each attempt (e.g., 2.0 doubles the delay).
        multiplier: f64,
        /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
        jitter_factor: f64,
    },
}

/// Configuration for reconnection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt (and every attempt, for `Fixed`).
    pub delay: Duration,
    /// Delay strategy.
    pub strategy: ReconnectStrategy,
    /// Maximum number of consecutive attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectConfig {
    /// Fixed delay, unlimited attempts.
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            strategy: ReconnectStrategy::Fixed,
            max_attempts: 0,
        }
    }

    /// Exponential backoff starting at `delay`, doubling up to `max_delay`
    /// with ±10% jitter.
    #[must_use]
    pub const fn exponential(delay: Duration, max_delay: Duration) -> Self {
        Self {
            delay,
            strategy: ReconnectStrategy::Exponential {
                max_delay,
                multiplier: 2.0,
                jitter_factor: 0.1,
            },
            max_attempts: 0,
        }
    }

    /// Limit the number of consecutive attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Reconnection policy tracking consecutive failed attempts.
///
/// # Example
///
/// ```rust
/// use alert_feed_client::application::services::reconnect::{ReconnectConfig, ReconnectPolicy};
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::fixed(Duration::from_secs(5)));
///
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(5)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(5)));
///
/// // Simulate successful connection
/// policy.reset();
/// assert_eq!(policy.attempt_count(), 0);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// Get the delay for the next attempt.
    ///
    /// Returns `None` if max attempts have been exceeded.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        self.attempt_count = self.attempt_count.saturating_add(1);

        match self.config.strategy {
            ReconnectStrategy::Fixed => Some(self.config.delay),
            ReconnectStrategy::Exponential {
                max_delay,
                multiplier,
                jitter_factor,
            } => {
                let delay_with_jitter = apply_jitter(self.current_delay, jitter_factor);
                self.current_delay = scale_delay(self.current_delay, multiplier, max_delay);
                Some(delay_with_jitter)
            }
        }
    }

    /// Reset the policy after a successful connection.
    pub const fn reset(&mut self) {
        self.current_delay = self.config.delay;
        self.attempt_count = 0;
    }

    /// Consecutive attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Check if reconnection should continue.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// The configuration this policy was built from.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }
}

fn scale_delay(current: Duration, multiplier: f64, max_delay: Duration) -> Duration {
    #[allow(clippy::cast_precision_loss)]
    let scaled = (current.as_millis() as f64 * multiplier).round();
    let next_millis = if scaled.is_finite() && scaled > 0.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            scaled as u128
        }
    } else {
        0
    };
    let capped = next_millis.min(max_delay.as_millis());
    Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX))
}

fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    #[allow(clippy::cast_precision_loss)]
    let base_millis = duration.as_millis() as f64;
    let jitter_range = base_millis * jitter_factor;
    let mut rng = rand::rng();
    let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
    let adjusted_millis = (base_millis + jitter).max(1.0);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let adjusted_u64 = adjusted_millis as u64;
    Duration::from_millis(adjusted_u64)
}
