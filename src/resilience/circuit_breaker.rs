use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Where a family's breaker stands, derived from its failure tally.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    /// Tripped, still inside the cool-down after the last failure.
    Open,
    /// Tripped, cool-down over: one trial call may go through.
    HalfOpen,
}

#[derive(Debug, Copy, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    pub last_failure_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Tally {
    consecutive_failures: usize,
    last_failure_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Consecutive-failure breaker shared by every call of one operation family.
///
/// The circuit is open while the failure count is at or above the threshold
/// and the last failure is younger than the cool-down. After that one trial
/// call is admitted; success resets the count, failure restarts the
/// cool-down.
#[derive(Debug)]
pub struct CircuitBreaker {
    family: String,
    tally: Mutex<Tally>,
    failure_threshold: usize,
    cool_down: Duration,
}

/// Admission for one attempt. Dropped without an outcome, it frees the trial
/// slot it may hold.
#[derive(Debug)]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Permit<'_> {
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.settle(self.trial, false);
    }

    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.settle(self.trial, true);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

impl CircuitBreaker {
    pub fn new(family: impl Into<String>, failure_threshold: usize, cool_down: Duration) -> Self {
        Self {
            family: family.into(),
            tally: Mutex::new(Tally::default()),
            failure_threshold: failure_threshold.max(1),
            cool_down,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state_of(&self.lock())
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let tally = self.lock();
        CircuitBreakerSnapshot {
            state: self.state_of(&tally),
            consecutive_failures: tally.consecutive_failures,
            last_failure_at: tally.last_failure_at,
        }
    }

    /// Admits an attempt, or `None` while open or while a trial is running.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut tally = self.lock();
        let trial = match self.state_of(&tally) {
            CircuitState::Closed => false,
            CircuitState::Open => return None,
            CircuitState::HalfOpen if tally.trial_in_flight => return None,
            CircuitState::HalfOpen => {
                tally.trial_in_flight = true;
                true
            }
        };
        Some(Permit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn settle(&self, trial: bool, failed: bool) {
        let mut tally = self.lock();
        if trial {
            tally.trial_in_flight = false;
        }
        let was_tripped = self.tripped(&tally);

        if failed {
            tally.consecutive_failures = tally.consecutive_failures.saturating_add(1);
            tally.last_failure_at = Some(Instant::now());
            if !was_tripped && self.tripped(&tally) {
                tracing::warn!(
                    family = %self.family,
                    consecutive_failures = tally.consecutive_failures,
                    cool_down_ms = self.cool_down.as_millis() as u64,
                    "circuit opened"
                );
            } else if trial {
                tracing::warn!(family = %self.family, "trial call failed; circuit reopened");
            }
        } else {
            tally.consecutive_failures = 0;
            if was_tripped {
                tracing::info!(family = %self.family, "circuit closed");
            }
        }
    }

    fn tripped(&self, tally: &Tally) -> bool {
        tally.consecutive_failures >= self.failure_threshold
    }

    fn state_of(&self, tally: &Tally) -> CircuitState {
        if !self.tripped(tally) {
            return CircuitState::Closed;
        }
        match tally.last_failure_at {
            Some(at) if at.elapsed() < self.cool_down => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tally> {
        self.tally
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
