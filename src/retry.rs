//! Retry helper for flaky device operations.
//!
//! Nothing in the crate retries on its own; drivers opt in per call.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Zero behaves like one.
    pub attempts: u32,
    /// Delay before the second attempt.
    pub delay: Duration,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
            backoff: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `attempts` tries with a fixed `delay` between them.
    #[must_use]
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts,
            delay,
            backoff: 1.0,
            max_delay: delay,
        }
    }

    /// Same policy with a different backoff multiplier.
    #[must_use]
    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = backoff;
        self
    }

    /// Delay after failed attempt number `attempt` (0-based), or `None`
    /// when no attempts are left.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt + 1 >= self.attempts.max(1) {
            return None;
        }
        let factor = self.backoff.max(1.0).powi(attempt as i32);
        let secs = self.delay.as_secs_f64() * factor;
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

/// Call `op` until it succeeds or `policy` runs out of attempts.
///
/// Each failure is logged at WARN. The error from the last attempt is
/// returned.
///
/// ```
/// use consolebench::retry::{retry_on_error, RetryPolicy};
/// use std::time::Duration;
///
/// let mut tries = 0;
/// let value = retry_on_error(&RetryPolicy::fixed(3, Duration::ZERO), || {
///     tries += 1;
///     if tries < 3 { Err("not yet") } else { Ok(tries) }
/// });
/// assert_eq!(value, Ok(3));
/// ```
pub fn retry_on_error<T, E, F>(policy: &RetryPolicy, mut op: F) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(error) => match policy.delay_for_attempt(attempt) {
                Some(delay) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        of = policy.attempts,
                        ?delay,
                        "attempt failed, retrying: {error}"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                None => {
                    tracing::warn!(attempt = attempt + 1, "giving up: {error}");
                    return Err(error);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_error_returned() {
        let mut calls = 0;
        let result: Result<(), String> = retry_on_error(&RetryPolicy::fixed(4, Duration::ZERO), || {
            calls += 1;
            Err(format!("failure {calls}"))
        });
        assert_eq!(result.unwrap_err(), "failure 4");
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_zero_attempts_runs_once() {
        let mut calls = 0;
        let _ = retry_on_error(&RetryPolicy::fixed(0, Duration::ZERO), || -> Result<(), &str> {
            calls += 1;
            Err("nope")
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy {
            attempts: 10,
            delay: Duration::from_secs(1),
            backoff: 2.0,
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(5)));
        assert_eq!(policy.delay_for_attempt(9), None);
    }
}
