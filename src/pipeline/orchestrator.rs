use super::outcome::{OrchestrationError, TranscriptHandle};
use super::progress::{CurrentStatus, ProgressTracker};
use super::run::{Run, RunId, RunOptions};
use super::stage::Stage;
use crate::credentials::TokenManager;
use crate::error::ServiceError;
use crate::resilience::{families, RetryEngine, RetryPolicy};
use crate::runtime::telemetry::Telemetry;
use crate::services::{Identity, JobId, JobPhase, ServiceClients, TranscriptSink};
use crate::status::{StatusBroadcaster, StatusRecord, StatusSubscription};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Longest URL accepted for submission, in bytes.
pub const MAX_URL_BYTES: usize = 2048;
/// Polling progress stays below this until the job reports completion.
const POLLING_PROGRESS_CEILING: f64 = 0.99;

/// Per-orchestrator settings that do not change between runs.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub identity: Identity,
    pub retry_policy: RetryPolicy,
    pub poll_interval: Duration,
    pub max_poll_attempts: usize,
}

/// Drives runs through the fixed stage sequence. Each stage makes one remote
/// call through the retry engine; any failure ends the run as `Failed`.
///
/// Runs are independent and may execute concurrently on one orchestrator;
/// they share the token manager and the per-family breakers.
pub struct Orchestrator {
    clients: ServiceClients,
    tokens: Arc<TokenManager>,
    status: Arc<StatusBroadcaster>,
    engine: Arc<RetryEngine>,
    settings: PipelineSettings,
    progress: ProgressTracker,
    telemetry: Arc<Telemetry>,
    sink: Option<Arc<dyn TranscriptSink>>,
}

impl Orchestrator {
    pub fn new(
        clients: ServiceClients,
        tokens: Arc<TokenManager>,
        status: Arc<StatusBroadcaster>,
        engine: Arc<RetryEngine>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            clients,
            tokens,
            status,
            engine,
            settings,
            progress: ProgressTracker::new(),
            telemetry: Arc::new(Telemetry::default()),
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn TranscriptSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Runs the whole pipeline for `url` under a fresh run id.
    pub async fn process_video(&self, url: &str) -> Result<TranscriptHandle, OrchestrationError> {
        self.process_video_with(url, RunOptions::default()).await
    }

    pub async fn process_video_with(
        &self,
        url: &str,
        options: RunOptions,
    ) -> Result<TranscriptHandle, OrchestrationError> {
        let run_id = options.run_id.unwrap_or_else(RunId::generate);
        let cancellation = options.cancellation.unwrap_or_default();
        let mut run = Run::new(run_id, url.trim().to_owned());

        self.telemetry.record_run_started();
        self.progress.begin_run();
        tracing::info!(run_id = %run.id(), url = run.url(), "run started");

        let outcome = self.drive(&mut run, &cancellation).await;

        self.progress.end_run();
        self.conclude(&mut run, &outcome).await;
        outcome
    }

    /// Returns the in-memory status to `Idle` with zero progress.
    pub fn reset(&self) {
        self.progress.reset();
    }

    pub fn current_status(&self) -> CurrentStatus {
        self.progress.current()
    }

    pub fn subscribe(&self) -> StatusSubscription {
        self.status.subscribe()
    }

    pub fn snapshot(&self) -> HashMap<RunId, StatusRecord> {
        self.status.snapshot()
    }

    pub fn broadcaster(&self) -> &Arc<StatusBroadcaster> {
        &self.status
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    pub fn retry_engine(&self) -> &Arc<RetryEngine> {
        &self.engine
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    async fn drive(
        &self,
        run: &mut Run,
        cancel: &CancellationToken,
    ) -> Result<TranscriptHandle, OrchestrationError> {
        validate_url(run.url()).map_err(|err| OrchestrationError::new(Stage::Idle, err))?;

        let identity = &self.settings.identity;
        let policy = &self.settings.retry_policy;

        self.enter(run, Stage::HealthCheck, "Contacting the transcription service");
        let liveness = &self.clients.liveness;
        let health = self
            .guard(
                Stage::HealthCheck,
                cancel,
                self.engine
                    .execute_with_cancellation(families::HEALTH, policy, cancel, |_| {
                        liveness.check_health()
                    }),
            )
            .await?;
        tracing::debug!(run_id = %run.id(), health = health.as_str(), "service is live");

        self.enter(run, Stage::CreditCheck, "Checking available credits");
        let balance = self
            .guard(Stage::CreditCheck, cancel, self.tokens.check_balance(identity))
            .await?;
        if balance <= 0 {
            return Err(OrchestrationError::new(
                Stage::CreditCheck,
                ServiceError::insufficient_credits(format!("credit balance is {balance}")),
            ));
        }

        self.enter(run, Stage::TokenVending, "Obtaining an access token");
        // detached so a vend already on the wire still lands in the ledger
        // after the run is cancelled
        let vend = {
            let tokens = self.tokens.clone();
            let identity = identity.clone();
            tokio::spawn(async move { tokens.get_valid_token(&identity).await })
        };
        let token = self
            .guard(Stage::TokenVending, cancel, async {
                vend.await.unwrap_or_else(|err| {
                    Err(ServiceError::Server {
                        status: 500,
                        message: format!("token vend task failed: {err}"),
                    })
                })
            })
            .await?;

        self.enter(run, Stage::TranscriptionSubmission, "Submitting the video");
        let submitter = &self.clients.submitter;
        let url = run.url().to_owned();
        let job = self
            .guard(
                Stage::TranscriptionSubmission,
                cancel,
                self.engine
                    .execute_with_cancellation(families::JOB_SUBMIT, policy, cancel, |_| {
                        submitter.submit(token.token(), &url)
                    }),
            )
            .await?;
        tracing::info!(run_id = %run.id(), job_id = %job, "job submitted");

        let transcript = self.poll_until_done(run, cancel, token.token(), &job).await?;

        Ok(TranscriptHandle {
            run_id: run.id().clone(),
            job_id: job,
            url,
            transcript,
        })
    }

    /// Polls immediately, then every `poll_interval`, for at most
    /// `max_poll_attempts` checks.
    async fn poll_until_done(
        &self,
        run: &mut Run,
        cancel: &CancellationToken,
        token: &str,
        job: &JobId,
    ) -> Result<String, OrchestrationError> {
        const STAGE: Stage = Stage::PollingCompletion;

        self.enter(run, STAGE, "Waiting for the transcript");
        let poller = &self.clients.poller;
        let policy = &self.settings.retry_policy;
        let max_attempts = self.settings.max_poll_attempts.max(1);
        let started = Instant::now();

        for attempt in 1..=max_attempts {
            let status = self
                .guard(
                    STAGE,
                    cancel,
                    self.engine
                        .execute_with_cancellation(families::JOB_POLL, policy, cancel, |_| {
                            poller.poll(token, job)
                        }),
                )
                .await?;
            self.telemetry.record_poll();

            match status.phase {
                JobPhase::Complete => {
                    return match status.transcript.filter(|text| !text.trim().is_empty()) {
                        Some(transcript) => Ok(transcript),
                        None => Err(OrchestrationError::new(
                            STAGE,
                            ServiceError::JobFailed {
                                message: "job completed without a transcript".into(),
                            },
                        )),
                    };
                }
                JobPhase::Failed => {
                    let message = status
                        .error
                        .unwrap_or_else(|| "no reason reported".to_owned());
                    return Err(OrchestrationError::new(
                        STAGE,
                        ServiceError::JobFailed { message },
                    ));
                }
                JobPhase::Pending => {
                    let progress = polling_progress(status.percent, attempt, max_attempts);
                    run.advance(STAGE, Some(progress));
                    self.publish(run, format!("Still processing (check {attempt}/{max_attempts})"));
                    tracing::debug!(
                        run_id = %run.id(),
                        job_id = %job,
                        attempt,
                        percent = status.percent,
                        "job still pending"
                    );
                }
            }

            if attempt < max_attempts {
                self.guard(STAGE, cancel, async {
                    tokio::time::sleep(self.settings.poll_interval).await;
                    Ok(())
                })
                .await?;
            }
        }

        Err(OrchestrationError::new(
            STAGE,
            ServiceError::TimeoutExceeded {
                attempts: max_attempts,
                elapsed: started.elapsed(),
            },
        ))
    }

    /// Awaits one suspension point, short-circuiting on cancellation and
    /// applying failures to the token ledger.
    async fn guard<T, F>(
        &self,
        stage: Stage,
        cancel: &CancellationToken,
        future: F,
    ) -> Result<T, OrchestrationError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ServiceError::Cancelled),
            result = future => result,
        };
        outcome.map_err(|err| {
            self.tokens.absorb_failure(&err);
            OrchestrationError::new(stage, err)
        })
    }

    fn enter(&self, run: &mut Run, stage: Stage, detail: &str) {
        run.advance(stage, stage.entry_progress());
        tracing::info!(run_id = %run.id(), stage = %stage, "stage entered");
        self.publish(run, detail);
    }

    fn publish(&self, run: &Run, detail: impl Into<String>) {
        self.progress.update(run.stage(), run.progress());
        self.status.publish(StatusRecord::new(
            run.id().clone(),
            run.stage(),
            run.progress(),
            detail,
        ));
    }

    async fn conclude(
        &self,
        run: &mut Run,
        outcome: &Result<TranscriptHandle, OrchestrationError>,
    ) {
        let elapsed_ms = run.started_at().elapsed().as_millis() as u64;
        match outcome {
            Ok(handle) => {
                self.telemetry.record_run_completed();
                tracing::info!(
                    run_id = %run.id(),
                    job_id = %handle.job_id,
                    elapsed_ms,
                    "run completed"
                );
            }
            Err(err) if err.is_cancelled() => {
                self.telemetry.record_run_cancelled();
                tracing::info!(run_id = %run.id(), stage = %err.stage(), elapsed_ms, "run cancelled");
            }
            Err(err) => {
                self.telemetry.record_run_failed();
                tracing::warn!(
                    run_id = %run.id(),
                    stage = %err.stage(),
                    code = err.code(),
                    error = %err.service_error(),
                    elapsed_ms,
                    "run failed"
                );
            }
        }

        let detail = match outcome {
            Ok(_) => "Transcript ready".to_owned(),
            Err(err) => format!("{}: {}", err.code(), err.service_error()),
        };
        run.finish(outcome.is_ok());
        self.publish(run, detail);

        if let (Some(sink), Ok(handle)) = (&self.sink, outcome) {
            if let Err(err) = sink.store(handle).await {
                tracing::warn!(run_id = %handle.run_id, error = %err, "transcript sink failed");
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("current", &self.progress.current())
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

/// Accepts a trimmed, non-empty http(s) URL of bounded length.
pub(crate) fn validate_url(url: &str) -> Result<(), ServiceError> {
    if url.is_empty() {
        return Err(ServiceError::validation("video url is empty"));
    }
    if url.len() > MAX_URL_BYTES {
        return Err(ServiceError::validation(format!(
            "video url exceeds {MAX_URL_BYTES} bytes"
        )));
    }
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => Err(ServiceError::validation(
            "video url must be an http:// or https:// address",
        )),
    }
}

/// Reported percent maps onto 0.5..1.0; without it progress creeps with the
/// attempt count. Either way it stays below completion.
fn polling_progress(percent: Option<u8>, attempt: usize, max_attempts: usize) -> f64 {
    let fraction = match percent {
        Some(percent) => f64::from(percent.min(100)) / 100.0,
        None => attempt as f64 / (max_attempts as f64 + 1.0),
    };
    (0.5 + 0.5 * fraction).min(POLLING_PROGRESS_CEILING)
}
