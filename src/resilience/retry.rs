//! The generic execute-with-retry loop: breaker gating, retryability
//! classification, jittered exponential backoff and consistent logging.

use super::circuit_breaker::CircuitBreakerSnapshot;
use super::metrics::{RetryMetrics, RetryMetricsSnapshot};
use super::policy::RetryPolicy;
use super::registry::BreakerRegistry;
use crate::error::ServiceError;
use std::future::Future;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

fn duration_to_millis(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Wraps fallible remote calls with per-family circuit breaking and
/// jittered exponential backoff. Knows nothing about what the wrapped call
/// does beyond its outcome and whether the failure is retryable.
#[derive(Debug, Default)]
pub struct RetryEngine {
    registry: BreakerRegistry,
    metrics: RetryMetrics,
}

impl RetryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn breaker_snapshot(&self, family: &str) -> Option<CircuitBreakerSnapshot> {
        self.registry.snapshot(family)
    }

    pub fn families(&self) -> Vec<String> {
        self.registry.families()
    }

    pub fn metrics(&self) -> RetryMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Runs `action` (called with the one-based attempt number) until it
    /// succeeds, fails with a non-retryable error, opens the circuit, or uses
    /// up `policy.max_attempts`.
    pub async fn execute<T, F, Fut>(
        &self,
        family: &str,
        policy: &RetryPolicy,
        action: F,
    ) -> Result<T, ServiceError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.run(family, policy, None, action).await
    }

    /// Same as [`Self::execute`], but a cancelled token aborts the in-flight
    /// attempt or backoff with [`ServiceError::Cancelled`].
    pub async fn execute_with_cancellation<T, F, Fut>(
        &self,
        family: &str,
        policy: &RetryPolicy,
        cancellation: &CancellationToken,
        action: F,
    ) -> Result<T, ServiceError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.run(family, policy, Some(cancellation), action).await
    }

    async fn run<T, F, Fut>(
        &self,
        family: &str,
        policy: &RetryPolicy,
        cancellation: Option<&CancellationToken>,
        mut action: F,
    ) -> Result<T, ServiceError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let breaker = self.registry.breaker(family, policy);
        let mut attempt = 0;

        loop {
            if cancellation.is_some_and(|token| token.is_cancelled()) {
                return Err(ServiceError::Cancelled);
            }

            let Some(permit) = breaker.try_acquire() else {
                self.metrics.record_circuit_rejection();
                tracing::warn!(family, "circuit breaker open; rejecting call");
                return Err(ServiceError::CircuitOpen {
                    family: family.to_owned(),
                });
            };

            attempt += 1;
            tracing::trace!(family, attempt, trial = permit.is_trial(), "attempt admitted");
            let start = Instant::now();

            let outcome = match cancellation {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => Err(ServiceError::Cancelled),
                    result = action(attempt) => result,
                },
                None => action(attempt).await,
            };

            let err = match outcome {
                Ok(value) => {
                    permit.succeed();
                    self.metrics.record_success(start.elapsed());
                    tracing::debug!(family, attempt, "call succeeded");
                    return Ok(value);
                }
                // the unsettled permit drops here and frees its trial slot
                Err(ServiceError::Cancelled) => return Err(ServiceError::Cancelled),
                Err(err) => err,
            };

            self.metrics.record_failure(start.elapsed());

            if !err.is_retryable() {
                permit.succeed();
                tracing::debug!(
                    family,
                    attempt,
                    error = %err,
                    kind = %err.kind(),
                    "non-retryable failure; aborting"
                );
                return Err(err);
            }

            permit.fail();

            if breaker.is_open() {
                tracing::error!(family, attempt, error = %err, "failure opened the circuit; giving up");
                return Err(err);
            }

            if attempt >= policy.max_attempts {
                tracing::error!(family, attempt, error = %err, "call exhausted retries");
                return Err(err);
            }

            let backoff = policy.backoff(attempt - 1);
            self.metrics.record_retry();
            tracing::warn!(
                family,
                attempt,
                backoff_ms = duration_to_millis(backoff),
                error = %err,
                "call failed; retrying"
            );
            sleep_with_cancellation(backoff, cancellation).await?;
        }
    }
}

async fn sleep_with_cancellation(
    delay: Duration,
    cancellation: Option<&CancellationToken>,
) -> Result<(), ServiceError> {
    if delay.is_zero() {
        yield_now().await;
        return Ok(());
    }

    if let Some(token) = cancellation {
        tokio::select! {
            _ = token.cancelled() => Err(ServiceError::Cancelled),
            _ = sleep(delay) => Ok(()),
        }
    } else {
        sleep(delay).await;
        Ok(())
    }
}
