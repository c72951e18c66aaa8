//! REST implementation of the five remote contracts. Maps transport failures
//! and HTTP status codes onto [`ServiceError`]; retrying is left to the
//! resilience engine.

use super::types::{Identity, JobId, JobPhase, JobStatus, VendedToken};
use super::{CreditClient, JobPoller, JobSubmitter, LivenessClient, TokenVendor};
use crate::error::ServiceError;
use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const CLIENT_REQUEST_ID_HEADER: &str = "X-Client-Request-Id";
const MAX_ERROR_BODY_CHARS: usize = 256;

#[derive(Debug, Clone)]
pub struct HttpBackendOptions {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpBackendOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            user_agent: concat!("scribeline/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl HttpBackendOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: i64,
}

#[derive(Debug, Serialize)]
struct VendRequest<'a> {
    #[serde(rename = "clientRequestId")]
    client_request_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct VendResponse {
    token: String,
    #[serde(default)]
    scope: String,
    #[serde(rename = "expiresIn", default)]
    expires_in: Option<u64>,
    #[serde(rename = "balanceAfter")]
    balance_after: i64,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "requestId")]
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    transcript: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the liveness, credit, vending, submission and status
/// endpoints of one service base URL.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: Arc<String>,
    client: Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, HttpBackendOptions::default())
    }

    pub fn with_options(base_url: impl Into<String>, options: HttpBackendOptions) -> Result<Self> {
        options.validate()?;

        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("service url must start with http:// or https://");
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .user_agent(options.user_agent.as_str())
            .default_headers(headers)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: Arc::new(base_url),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        label: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = request
            .send()
            .await
            .map_err(|err| map_transport_error(label, &err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(
                endpoint = label,
                status = status.as_u16(),
                "remote call returned error status"
            );
            return Err(ServiceError::from_status(
                status.as_u16(),
                format!("{label}: {}", summarize_body(&body)),
            ));
        }

        response.json::<T>().await.map_err(|err| {
            if err.is_timeout() {
                map_transport_error(label, &err)
            } else {
                ServiceError::Validation {
                    status: Some(status.as_u16()),
                    message: format!("{label}: unexpected response body: {err}"),
                }
            }
        })
    }
}

impl LivenessClient for HttpBackend {
    fn check_health(&self) -> BoxFuture<'_, Result<String, ServiceError>> {
        Box::pin(async move {
            let response: HealthResponse = self
                .send("health", self.client.get(self.url("/health")))
                .await?;
            Ok(response.status)
        })
    }
}

impl CreditClient for HttpBackend {
    fn balance<'a>(&'a self, identity: &'a Identity) -> BoxFuture<'a, Result<i64, ServiceError>> {
        Box::pin(async move {
            let request = self
                .client
                .get(self.url("/credits/balance"))
                .bearer_auth(identity.credential());
            let response: BalanceResponse = self.send("credits/balance", request).await?;
            Ok(response.balance)
        })
    }
}

impl TokenVendor for HttpBackend {
    fn vend<'a>(
        &'a self,
        identity: &'a Identity,
        client_request_id: &'a str,
    ) -> BoxFuture<'a, Result<VendedToken, ServiceError>> {
        Box::pin(async move {
            let request = self
                .client
                .post(self.url("/vend-token"))
                .bearer_auth(identity.credential())
                .header(CLIENT_REQUEST_ID_HEADER, client_request_id)
                .json(&VendRequest { client_request_id });
            let response: VendResponse = self.send("vend-token", request).await?;

            if response.token.trim().is_empty() {
                return Err(ServiceError::Validation {
                    status: None,
                    message: "vend-token: response carried an empty token".into(),
                });
            }

            Ok(VendedToken {
                token: response.token,
                scope: response.scope,
                expires_in: response.expires_in.map(Duration::from_secs),
                balance_after: response.balance_after,
            })
        })
    }
}

impl JobSubmitter for HttpBackend {
    fn submit<'a>(
        &'a self,
        token: &'a str,
        url: &'a str,
    ) -> BoxFuture<'a, Result<JobId, ServiceError>> {
        Box::pin(async move {
            let request = self
                .client
                .post(self.url("/transcribe"))
                .bearer_auth(token)
                .json(&SubmitRequest { url });
            let response: SubmitResponse = self.send("transcribe", request).await?;
            if response.request_id.trim().is_empty() {
                return Err(ServiceError::Validation {
                    status: None,
                    message: "transcribe: response carried an empty request id".into(),
                });
            }
            Ok(JobId::new(response.request_id))
        })
    }
}

impl JobPoller for HttpBackend {
    fn poll<'a>(
        &'a self,
        token: &'a str,
        job: &'a JobId,
    ) -> BoxFuture<'a, Result<JobStatus, ServiceError>> {
        Box::pin(async move {
            let request = self
                .client
                .get(self.url(&format!("/status/{}", job.as_str())))
                .bearer_auth(token);
            let response: StatusResponse = self.send("status", request).await?;
            Ok(status_from_response(response))
        })
    }
}

fn status_from_response(response: StatusResponse) -> JobStatus {
    let phase = match response.status.trim().to_ascii_lowercase().as_str() {
        "completed" | "complete" | "done" => JobPhase::Complete,
        "failed" | "error" => JobPhase::Failed,
        "pending" | "queued" | "processing" => JobPhase::Pending,
        other => {
            tracing::debug!(status = other, "unrecognised job status; treating as pending");
            JobPhase::Pending
        }
    };

    let percent = response
        .progress
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(0.0, 100.0).round() as u8);

    JobStatus {
        phase,
        percent,
        transcript: response.transcript,
        error: response.error,
    }
}

fn map_transport_error(label: &'static str, err: &reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::network(format!("{label}: request timed out"))
    } else if err.is_connect() {
        ServiceError::network(format!("{label}: connection failed: {err}"))
    } else {
        ServiceError::network(format!("{label}: {err}"))
    }
}

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_owned();
    }
    let mut summary: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    if trimmed.chars().count() > MAX_ERROR_BODY_CHARS {
        summary.push('…');
    }
    summary
}
