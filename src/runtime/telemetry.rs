use crate::resilience::RetryEngine;
use crate::status::StatusBroadcaster;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Run-level counters shared by the orchestrator and the token manager.
#[derive(Default, Debug)]
pub struct Telemetry {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    runs_cancelled: AtomicU64,
    polls: AtomicU64,
    token_vends: AtomicU64,
}

impl Telemetry {
    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_completed(&self) {
        self.runs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_failed(&self) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_cancelled(&self) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_token_vend(&self) {
        self.token_vends.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
            token_vends: self.token_vends.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub runs_cancelled: u64,
    pub polls: u64,
    pub token_vends: u64,
}

impl TelemetrySnapshot {
    /// Runs started but not yet concluded.
    pub fn runs_in_flight(&self) -> u64 {
        self.runs_started
            .saturating_sub(self.runs_completed + self.runs_failed + self.runs_cancelled)
    }
}

/// Spawns a background task that periodically logs run counters, active
/// runs, and retry-engine health until `shutdown` fires.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    status: Arc<StatusBroadcaster>,
    engine: Arc<RetryEngine>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "scribeline::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let snapshot = telemetry.snapshot();
                    let retries = engine.metrics();
                    let open_circuits = engine
                        .families()
                        .iter()
                        .filter_map(|family| engine.breaker_snapshot(family))
                        .filter(|breaker| breaker.state != crate::resilience::CircuitState::Closed)
                        .count();

                    tracing::info!(
                        target: "scribeline::metrics",
                        runs_started = snapshot.runs_started,
                        runs_completed = snapshot.runs_completed,
                        runs_failed = snapshot.runs_failed,
                        runs_cancelled = snapshot.runs_cancelled,
                        active_runs = status.active_runs().len(),
                        subscribers = status.subscriber_count(),
                        polls = snapshot.polls,
                        token_vends = snapshot.token_vends,
                        remote_attempts = retries.total_attempts,
                        remote_retries = retries.total_retries,
                        error_rate = %format!("{:.3}", retries.error_rate),
                        open_circuits,
                        "runtime metrics snapshot"
                    );
                }
            }
        }
    })
}
