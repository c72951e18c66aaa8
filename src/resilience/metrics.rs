//! Lightweight counters tracking attempts, failures, retries and breaker
//! rejections so the engine can expose aggregated snapshots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub(crate) struct RetryMetrics {
    total_attempts: AtomicU64,
    total_failures: AtomicU64,
    total_retries: AtomicU64,
    circuit_rejections: AtomicU64,
    total_latency_ns: AtomicU64,
}

impl RetryMetrics {
    pub(crate) fn record_success(&self, latency: Duration) {
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, latency: Duration) {
        self.record_success(latency);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.total_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_circuit_rejection(&self) {
        self.circuit_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RetryMetricsSnapshot {
        let total_attempts = self.total_attempts.load(Ordering::Relaxed);
        let total_failures = self.total_failures.load(Ordering::Relaxed);
        let total_latency_ns = self.total_latency_ns.load(Ordering::Relaxed);

        let average_latency_ms = if total_attempts == 0 {
            0.0
        } else {
            (total_latency_ns as f64 / total_attempts as f64) / 1_000_000.0
        };

        let error_rate = if total_attempts == 0 {
            0.0
        } else {
            total_failures as f64 / total_attempts as f64
        };

        RetryMetricsSnapshot {
            total_attempts,
            total_failures,
            total_retries: self.total_retries.load(Ordering::Relaxed),
            circuit_rejections: self.circuit_rejections.load(Ordering::Relaxed),
            average_latency_ms,
            error_rate,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct RetryMetricsSnapshot {
    pub total_attempts: u64,
    pub total_failures: u64,
    pub total_retries: u64,
    pub circuit_rejections: u64,
    pub average_latency_ms: f64,
    pub error_rate: f64,
}
