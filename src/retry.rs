//! Bounded retry with exponential backoff
//!
//! A [`RetryPolicy`] is a plain value wrapped around an external call site. The
//! caller decides which errors are worth retrying; everything else is returned
//! on the first failure.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::time::Duration;
use tracing::warn;

/// Retry schedule: `multiplier * 2^(attempt - 1)` seconds, clamped to `[min_wait, max_wait]`
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub multiplier: f64,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, multiplier: f64, min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts,
            multiplier,
            min_wait,
            max_wait,
        }
    }

    /// Constant wait between attempts
    pub fn fixed(wait: Duration, max_attempts: u32) -> Self {
        Self::new(max_attempts, 0.0, wait, wait)
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::fixed(Duration::ZERO, 1)
    }

    /// Wait before the attempt following `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        let secs = self.multiplier * 2f64.powi(exponent);
        let secs = secs
            .min(self.max_wait.as_secs_f64())
            .max(self.min_wait.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_wait)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out
    ///
    /// `op` receives the 1-based attempt number. The error from the last attempt
    /// is returned unchanged.
    pub fn run<T, E, F, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts && is_retryable(&e) => {
                    let wait = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        "Retryable failure: {}",
                        e
                    );
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Serialized form of a [`RetryPolicy`] used in configuration files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub multiplier: f64,
    pub min_wait_secs: f64,
    pub max_wait_secs: f64,
}

impl RetryConfig {
    /// Waits that are negative become zero; out-of-range ones saturate
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            self.multiplier,
            secs_to_duration(self.min_wait_secs),
            secs_to_duration(self.max_wait_secs),
        )
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
