use super::circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot};
use super::policy::RetryPolicy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Lazily creates one [`CircuitBreaker`] per operation family.
///
/// The threshold and cool-down of a family are fixed by the policy seen on
/// its first call.
#[derive(Debug, Default)]
pub struct BreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn breaker(&self, family: &str, policy: &RetryPolicy) -> Arc<CircuitBreaker> {
        let mut breakers = self
            .breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        breakers
            .entry(family.to_owned())
            .or_insert_with(|| {
                tracing::debug!(
                    family,
                    threshold = policy.failure_threshold,
                    cool_down_ms = policy.cool_down.as_millis() as u64,
                    "registering circuit breaker"
                );
                Arc::new(CircuitBreaker::new(
                    family,
                    policy.failure_threshold,
                    policy.cool_down,
                ))
            })
            .clone()
    }

    pub fn snapshot(&self, family: &str) -> Option<CircuitBreakerSnapshot> {
        self.breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(family)
            .map(|breaker| breaker.snapshot())
    }

    pub fn families(&self) -> Vec<String> {
        let mut families: Vec<String> = self
            .breakers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        families.sort();
        families
    }
}
