use super::stage::Stage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Synchronous view of the orchestrator: the most recently updated stage and
/// progress, and whether any run is in flight.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CurrentStatus {
    pub stage: Stage,
    pub progress: f64,
    pub busy: bool,
}

/// Tracks the orchestrator's current stage and progress in memory, without
/// going through the status broadcaster. Stage and progress are written as
/// one pair.
#[derive(Debug)]
pub struct ProgressTracker {
    latest: Mutex<(Stage, f64)>,
    in_flight: AtomicUsize,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new((Stage::Idle, 0.0)),
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn begin_run(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub fn end_run(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            });
    }

    pub fn update(&self, stage: Stage, progress: f64) {
        *self.latest() = (stage, progress.clamp(0.0, 1.0));
    }

    /// Back to `Idle` with zero progress. In-flight accounting is untouched.
    pub fn reset(&self) {
        self.update(Stage::Idle, 0.0);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> CurrentStatus {
        let (stage, progress) = *self.latest();
        CurrentStatus {
            stage,
            progress,
            busy: self.in_flight() > 0,
        }
    }

    fn latest(&self) -> MutexGuard<'_, (Stage, f64)> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
