//! Capped exponential backoff for whole-call retries.

use std::time::Duration;

/// `delay(attempt) = min(initial * multiplier^(attempt - 1), max)`, attempts are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub initial_delay_secs: f64,
    pub multiplier: f64,
    pub max_delay_secs: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay_secs: 2.0,
            multiplier: 2.0,
            max_delay_secs: 60.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay in seconds to wait after the given failed attempt.
    pub fn delay_secs(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay_secs * self.multiplier.powi(exponent);
        if raw.is_finite() {
            raw.min(self.max_delay_secs).max(0.0)
        } else {
            self.max_delay_secs.max(0.0)
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::try_from_secs_f64(self.delay_secs(attempt)).unwrap_or(Duration::MAX)
    }
}
