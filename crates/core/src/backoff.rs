//! Bounded exponential backoff.
//!
//! Used by the status poller between attempts and by the archive client
//! between failed writes. The delay starts at
//! [`BackoffConfig::initial_delay`], grows by
//! [`BackoffConfig::multiplier`] after every attempt, and never exceeds
//! [`BackoffConfig::max_delay`].

use std::time::Duration;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each attempt.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Sum of every delay slept across `attempts` attempts.
///
/// There is no sleep after the last attempt, so `attempts` attempts sleep
/// `attempts - 1` times. Gives the wall-clock ceiling of a retry budget
/// (ignoring the time spent inside each attempt).
pub fn total_delay(attempts: u32, config: &BackoffConfig) -> Duration {
    let mut delay = config.initial_delay;
    let mut total = Duration::ZERO;
    for _ in 1..attempts {
        total += delay;
        delay = next_delay(delay, config);
    }
    total
}
