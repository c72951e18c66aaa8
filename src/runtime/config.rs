use crate::pipeline::PipelineSettings;
use crate::resilience::RetryPolicy;
use crate::runtime::telemetry;
use crate::services::{HttpBackendOptions, Identity};
use crate::status::DEFAULT_HISTORY_CAPACITY;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
const DEFAULT_MAX_POLL_ATTEMPTS: usize = 20;
const DEFAULT_TOKEN_TTL_SECS: u64 = 15 * 60;

/// Runtime configuration for the transcription engine.
///
/// All instances must be constructed via [`EngineConfig::builder`] or [`EngineConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Clone, PartialEq)]
pub struct EngineConfig {
    service_url: String,
    user_id: String,
    credential: String,
    request_timeout: Duration,
    poll_interval: Duration,
    max_poll_attempts: usize,
    token_ttl: Duration,
    history_capacity: usize,
    metrics_interval: Duration,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("service_url", &self.service_url)
            .field("user_id", &self.user_id)
            .field("credential", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("token_ttl", &self.token_ttl)
            .field("history_capacity", &self.history_capacity)
            .field("metrics_interval", &self.metrics_interval)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

pub struct EngineConfigParams {
    pub service_url: String,
    pub user_id: String,
    pub credential: String,
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: usize,
    pub token_ttl: Duration,
    pub history_capacity: usize,
    pub metrics_interval: Duration,
    pub retry_policy: RetryPolicy,
}

impl EngineConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: EngineConfigParams) -> Result<Self> {
        let EngineConfigParams {
            service_url,
            user_id,
            credential,
            request_timeout,
            poll_interval,
            max_poll_attempts,
            token_ttl,
            history_capacity,
            metrics_interval,
            retry_policy,
        } = params;

        let config = Self {
            service_url: trimmed_string(service_url),
            user_id: trimmed_string(user_id),
            credential: trimmed_string(credential),
            request_timeout,
            poll_interval,
            max_poll_attempts,
            token_ttl,
            history_capacity,
            metrics_interval,
            retry_policy,
        };

        config.validate()?;
        Ok(config)
    }

    /// Base URL (including scheme) of the transcription service.
    pub fn service_url(&self) -> &str {
        &self.service_url
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Per-request timeout applied to the HTTP client.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Delay between two status checks of a submitted job.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Status checks before a job is declared timed out.
    pub fn max_poll_attempts(&self) -> usize {
        self.max_poll_attempts
    }

    /// Token lifetime assumed when the vendor does not report one.
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Terminal status records kept for late readers.
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.user_id.clone(), self.credential.clone())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            identity: self.identity(),
            retry_policy: self.retry_policy.clone(),
            poll_interval: self.poll_interval,
            max_poll_attempts: self.max_poll_attempts,
        }
    }

    pub fn backend_options(&self) -> HttpBackendOptions {
        HttpBackendOptions {
            request_timeout: self.request_timeout,
            ..HttpBackendOptions::default()
        }
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.service_url)?;
        ensure_not_empty(&self.user_id, "user_id")?;
        ensure_not_empty(&self.credential, "credential")?;

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.max_poll_attempts == 0 {
            bail!("max_poll_attempts must be greater than 0");
        }

        if self.token_ttl.is_zero() {
            bail!("token_ttl must be greater than 0");
        }

        if self.history_capacity == 0 {
            bail!("history_capacity must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        self.retry_policy
            .validate()
            .context("invalid retry policy")?;

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct EngineConfigBuilder {
    service_url: Option<String>,
    user_id: Option<String>,
    credential: Option<String>,
    request_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    max_poll_attempts: Option<usize>,
    token_ttl: Option<Duration>,
    history_capacity: Option<usize>,
    metrics_interval: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
}

impl EngineConfigBuilder {
    pub fn service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn max_poll_attempts(mut self, attempts: usize) -> Self {
        self.max_poll_attempts = Some(attempts);
        self
    }

    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = Some(ttl);
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = Some(capacity);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let params = EngineConfigParams {
            service_url: self.service_url.context("service_url is required")?,
            user_id: self.user_id.context("user_id is required")?,
            credential: self.credential.context("credential is required")?,
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            poll_interval: self
                .poll_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            max_poll_attempts: self.max_poll_attempts.unwrap_or(DEFAULT_MAX_POLL_ATTEMPTS),
            token_ttl: self
                .token_ttl
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_TOKEN_TTL_SECS)),
            history_capacity: self.history_capacity.unwrap_or(DEFAULT_HISTORY_CAPACITY),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            retry_policy: self.retry_policy.unwrap_or_default(),
        };

        EngineConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("service_url must start with http:// or https://");
    }
    Ok(())
}
