use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use scribeline::{
    CreditClient, Engine, EngineConfig, Identity, JobId, JobPoller, JobStatus, JobSubmitter,
    LivenessClient, RetryPolicy, ServiceClients, ServiceError, StatusRecord, StatusSubscription,
    TokenVendor, TranscriptHandle, TranscriptSink, VendedToken,
};
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Retry policy with short, jitter-free delays.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        backoff_factor: 2.0,
        jitter_fraction: 0.0,
        failure_threshold: 5,
        cool_down: Duration::from_secs(30),
    }
}

pub fn test_config(service_url: &str, max_poll_attempts: usize) -> EngineConfig {
    EngineConfig::builder()
        .service_url(service_url)
        .user_id("user-1")
        .credential("identity-secret")
        .poll_interval(Duration::from_millis(100))
        .max_poll_attempts(max_poll_attempts)
        .retry_policy(fast_policy())
        .build()
        .expect("test config should be valid")
}

/// Engine wired to a scripted in-memory backend.
pub fn scripted_engine(backend: &Arc<ScriptedBackend>, max_poll_attempts: usize) -> Engine {
    Engine::with_clients(
        test_config("http://scripted.invalid", max_poll_attempts),
        ServiceClients::from_backend(backend.clone()),
    )
}

/// Drains every record already published to `subscription`.
pub fn drain(subscription: &mut StatusSubscription) -> Vec<StatusRecord> {
    let mut records = Vec::new();
    while let Some(record) = subscription.try_recv() {
        records.push(record);
    }
    records
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Health,
    Balance,
    Vend,
    Submit,
    Poll,
}

/// In-memory stand-in for every remote contract. Each operation replays its
/// scripted outcomes first, then falls back to a healthy default.
pub struct ScriptedBackend {
    balance: AtomicI64,
    health: Mutex<VecDeque<Result<String, ServiceError>>>,
    vends: Mutex<VecDeque<Result<VendedToken, ServiceError>>>,
    submits: Mutex<VecDeque<Result<JobId, ServiceError>>>,
    polls: Mutex<VecDeque<Result<JobStatus, ServiceError>>>,
    default_poll: Mutex<JobStatus>,
    submit_tokens: Mutex<Vec<String>>,
    calls: Mutex<Vec<Call>>,
    vend_count: AtomicUsize,
    vend_delay: Mutex<Duration>,
}

impl ScriptedBackend {
    pub fn new(balance: i64) -> Arc<Self> {
        Arc::new(Self {
            balance: AtomicI64::new(balance),
            health: Mutex::new(VecDeque::new()),
            vends: Mutex::new(VecDeque::new()),
            submits: Mutex::new(VecDeque::new()),
            polls: Mutex::new(VecDeque::new()),
            default_poll: Mutex::new(JobStatus::pending()),
            submit_tokens: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            vend_count: AtomicUsize::new(0),
            vend_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn script_health(&self, outcomes: impl IntoIterator<Item = Result<String, ServiceError>>) {
        self.health.lock().unwrap().extend(outcomes);
    }

    pub fn script_vends(
        &self,
        outcomes: impl IntoIterator<Item = Result<VendedToken, ServiceError>>,
    ) {
        self.vends.lock().unwrap().extend(outcomes);
    }

    pub fn script_submits(&self, outcomes: impl IntoIterator<Item = Result<JobId, ServiceError>>) {
        self.submits.lock().unwrap().extend(outcomes);
    }

    pub fn script_polls(&self, outcomes: impl IntoIterator<Item = Result<JobStatus, ServiceError>>) {
        self.polls.lock().unwrap().extend(outcomes);
    }

    pub fn set_default_poll(&self, status: JobStatus) {
        *self.default_poll.lock().unwrap() = status;
    }

    /// Makes every later vend take `delay` before answering.
    pub fn set_vend_delay(&self, delay: Duration) {
        *self.vend_delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls().into_iter().filter(|c| *c == call).count()
    }

    pub fn submit_tokens(&self) -> Vec<String> {
        self.submit_tokens.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl LivenessClient for ScriptedBackend {
    fn check_health(&self) -> BoxFuture<'_, Result<String, ServiceError>> {
        self.record(Call::Health);
        let outcome = self
            .health
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_owned()));
        Box::pin(async move { outcome })
    }
}

impl CreditClient for ScriptedBackend {
    fn balance<'a>(&'a self, _: &'a Identity) -> BoxFuture<'a, Result<i64, ServiceError>> {
        self.record(Call::Balance);
        let balance = self.balance.load(Ordering::SeqCst);
        Box::pin(async move { Ok(balance) })
    }
}

impl TokenVendor for ScriptedBackend {
    fn vend<'a>(
        &'a self,
        _: &'a Identity,
        _: &'a str,
    ) -> BoxFuture<'a, Result<VendedToken, ServiceError>> {
        self.record(Call::Vend);
        let scripted = self.vends.lock().unwrap().pop_front();
        let outcome = scripted.unwrap_or_else(|| {
            let serial = self.vend_count.fetch_add(1, Ordering::SeqCst);
            let balance_after = self.balance.fetch_sub(1, Ordering::SeqCst) - 1;
            Ok(VendedToken {
                token: format!("token-{serial}"),
                scope: "transcribe".to_owned(),
                expires_in: Some(Duration::from_secs(600)),
                balance_after,
            })
        });
        let delay = *self.vend_delay.lock().unwrap();
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        })
    }
}

impl JobSubmitter for ScriptedBackend {
    fn submit<'a>(
        &'a self,
        token: &'a str,
        _: &'a str,
    ) -> BoxFuture<'a, Result<JobId, ServiceError>> {
        self.record(Call::Submit);
        self.submit_tokens.lock().unwrap().push(token.to_owned());
        let outcome = self
            .submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(JobId::new("job-1")));
        Box::pin(async move { outcome })
    }
}

impl JobPoller for ScriptedBackend {
    fn poll<'a>(
        &'a self,
        _: &'a str,
        _: &'a JobId,
    ) -> BoxFuture<'a, Result<JobStatus, ServiceError>> {
        self.record(Call::Poll);
        let scripted = self.polls.lock().unwrap().pop_front();
        let outcome = scripted.unwrap_or_else(|| Ok(self.default_poll.lock().unwrap().clone()));
        Box::pin(async move { outcome })
    }
}

/// Sink that keeps every handle it receives, optionally failing each store.
#[derive(Default)]
pub struct RecordingSink {
    stored: Mutex<Vec<TranscriptHandle>>,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Vec<TranscriptHandle> {
        self.stored.lock().unwrap().clone()
    }
}

impl TranscriptSink for RecordingSink {
    fn store<'a>(&'a self, handle: &'a TranscriptHandle) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.stored.lock().unwrap().push(handle.clone());
            if self.fail {
                bail!("disk full");
            }
            Ok(())
        })
    }
}
