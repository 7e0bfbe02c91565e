//! Retry and backoff policy for outbound calls

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Per-call retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Perform exactly one attempt, no retry
    pub skip_backoff: bool,
    /// Total number of attempts before giving up
    pub retries: u32,
    /// Multiplier applied to the delay after each failed attempt
    pub backoff_factor: f64,
    /// Lower bound for the delay between attempts
    pub min_delay_ms: u64,
    /// Upper bound for the delay between attempts
    pub max_delay_ms: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            skip_backoff: false,
            retries: 3,
            backoff_factor: 2.0,
            min_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl FetchOptions {
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            ..Default::default()
        }
    }

    /// A single attempt with no backoff
    pub fn once() -> Self {
        Self {
            skip_backoff: true,
            ..Default::default()
        }
    }

    pub fn with_skip_backoff(mut self, skip: bool) -> Self {
        self.skip_backoff = skip;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_min_delay(mut self, ms: u64) -> Self {
        self.min_delay_ms = ms;
        self
    }

    pub fn with_max_delay(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.retries == 0 {
            return Err(DomainError::validation("retries must be at least 1"));
        }

        if self.min_delay_ms > self.max_delay_ms {
            return Err(DomainError::validation(format!(
                "min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }

        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(DomainError::validation(format!(
                "backoff_factor must be a finite value >= 1.0, got {}",
                self.backoff_factor
            )));
        }

        Ok(())
    }

    /// Number of attempts this policy allows
    pub fn max_attempts(&self) -> u32 {
        if self.skip_backoff { 1 } else { self.retries }
    }

    /// Delay to wait after the given failed attempt (1-indexed)
    ///
    /// Grows by `backoff_factor` per attempt and is clamped to
    /// `[min_delay_ms, max_delay_ms]`, so the sequence never decreases.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(64) as i32;
        let delay = self.min_delay_ms as f64 * self.backoff_factor.powi(exponent);
        let delay_ms = delay
            .max(self.min_delay_ms as f64)
            .min(self.max_delay_ms as f64) as u64;

        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_options_default() {
        let options = FetchOptions::default();
        assert_eq!(options.retries, 3);
        assert_eq!(options.backoff_factor, 2.0);
        assert!(!options.skip_backoff);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_delay_calculation() {
        let options = FetchOptions::new(6)
            .with_min_delay(100)
            .with_backoff_factor(2.0)
            .with_max_delay(1000);

        assert_eq!(options.delay_after_attempt(1), Duration::from_millis(100));
        assert_eq!(options.delay_after_attempt(2), Duration::from_millis(200));
        assert_eq!(options.delay_after_attempt(3), Duration::from_millis(400));
        assert_eq!(options.delay_after_attempt(4), Duration::from_millis(800));
        // Should cap at max_delay
        assert_eq!(options.delay_after_attempt(5), Duration::from_millis(1000));
        assert_eq!(options.delay_after_attempt(500), Duration::from_millis(1000));
    }

    #[test]
    fn test_skip_backoff_means_single_attempt() {
        assert_eq!(FetchOptions::once().max_attempts(), 1);
        assert_eq!(FetchOptions::new(5).max_attempts(), 5);
    }

    #[test]
    fn test_validate_rejects_bad_policies() {
        assert!(FetchOptions::new(0).validate().is_err());
        assert!(
            FetchOptions::default()
                .with_min_delay(2000)
                .with_max_delay(1000)
                .validate()
                .is_err()
        );
        assert!(
            FetchOptions::default()
                .with_backoff_factor(0.5)
                .validate()
                .is_err()
        );
    }
}
