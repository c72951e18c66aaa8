//! Retry and circuit-breaker knobs plus the backoff arithmetic derived from
//! them.

use anyhow::{bail, Result};
use rand::Rng;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
const DEFAULT_JITTER_FRACTION: f64 = 0.25;
const DEFAULT_FAILURE_THRESHOLD: usize = 5;
const DEFAULT_COOL_DOWN_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Fraction of the computed delay added or removed at random.
    pub jitter_fraction: f64,
    /// Consecutive retryable failures that open the circuit.
    pub failure_threshold: usize,
    pub cool_down: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter_fraction: DEFAULT_JITTER_FRACTION,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cool_down: Duration::from_secs(DEFAULT_COOL_DOWN_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("max_attempts must be greater than 0");
        }
        if self.base_delay.is_zero() {
            bail!("base_delay must be greater than 0");
        }
        if self.max_delay < self.base_delay {
            bail!("max_delay must be at least base_delay");
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            bail!("backoff_factor must be a finite value >= 1.0");
        }
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            bail!("jitter_fraction must be within [0.0, 1.0)");
        }
        if self.failure_threshold == 0 {
            bail!("failure_threshold must be greater than 0");
        }
        if self.cool_down.is_zero() {
            bail!("cool_down must be greater than 0");
        }
        Ok(())
    }

    /// Un-jittered delay after the failure of zero-based `attempt`:
    /// `min(max_delay, base_delay * factor^attempt)`.
    pub fn base_backoff(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        if capped.is_finite() {
            Duration::from_secs_f64(capped.max(0.0))
        } else {
            self.max_delay
        }
    }

    /// Delay actually slept before the next attempt. Jitter is multiplicative
    /// and the result never exceeds `max_delay`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        self.backoff_with(attempt, &mut rand::thread_rng())
    }

    pub(crate) fn backoff_with<R: Rng + ?Sized>(&self, attempt: usize, rng: &mut R) -> Duration {
        let base = self.base_backoff(attempt);
        if self.jitter_fraction <= 0.0 {
            return base;
        }
        let spread = rng.gen_range(-self.jitter_fraction..=self.jitter_fraction);
        base.mul_f64(1.0 + spread).min(self.max_delay)
    }
}
