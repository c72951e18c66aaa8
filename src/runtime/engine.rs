use crate::credentials::TokenManager;
use crate::pipeline::{OrchestrationError, Orchestrator, RunOptions, TranscriptHandle};
use crate::resilience::RetryEngine;
use crate::runtime::config::EngineConfig;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::services::{HttpBackend, ServiceClients, TranscriptSink};
use crate::status::StatusBroadcaster;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Composition root: builds the retry engine, token manager, broadcaster and
/// orchestrator for one identity and owns the root shutdown token.
pub struct Engine {
    config: EngineConfig,
    orchestrator: Arc<Orchestrator>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    reporter: Option<JoinHandle<()>>,
}

impl Engine {
    /// Wires an [`HttpBackend`] pointed at the configured service URL.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let backend = HttpBackend::with_options(config.service_url(), config.backend_options())
            .context("failed to build service backend")?;
        Ok(Self::with_clients(
            config,
            ServiceClients::from_backend(Arc::new(backend)),
        ))
    }

    /// Wires caller-provided clients, for alternate transports and tests.
    pub fn with_clients(config: EngineConfig, clients: ServiceClients) -> Self {
        let engine = Arc::new(RetryEngine::new());
        let telemetry = Arc::new(Telemetry::default());
        let tokens = Arc::new(
            TokenManager::new(
                engine.clone(),
                clients.credits.clone(),
                clients.vendor.clone(),
                config.retry_policy().clone(),
                config.token_ttl(),
            )
            .with_telemetry(telemetry.clone()),
        );
        let status = Arc::new(StatusBroadcaster::new(config.history_capacity()));
        let orchestrator = Orchestrator::new(
            clients,
            tokens,
            status,
            engine,
            config.pipeline_settings(),
        )
        .with_telemetry(telemetry.clone());

        Self {
            config,
            orchestrator: Arc::new(orchestrator),
            telemetry,
            shutdown: CancellationToken::new(),
            reporter: None,
        }
    }

    /// Attaches a sink for finished transcripts. Only valid before the
    /// orchestrator has been shared.
    pub fn with_sink(mut self, sink: Arc<dyn TranscriptSink>) -> Result<Self> {
        let orchestrator = Arc::try_unwrap(self.orchestrator)
            .map_err(|_| anyhow::anyhow!("orchestrator is already shared; attach the sink first"))?;
        self.orchestrator = Arc::new(orchestrator.with_sink(sink));
        Ok(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn broadcaster(&self) -> &Arc<StatusBroadcaster> {
        self.orchestrator.broadcaster()
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    /// Returns a clone of the root shutdown token. Runs started through the
    /// engine without their own token are cancelled with it.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn process_video(&self, url: &str) -> Result<TranscriptHandle, OrchestrationError> {
        self.process_video_with(url, RunOptions::default()).await
    }

    pub async fn process_video_with(
        &self,
        url: &str,
        mut options: RunOptions,
    ) -> Result<TranscriptHandle, OrchestrationError> {
        if options.cancellation.is_none() {
            options.cancellation = Some(self.shutdown.child_token());
        }
        self.orchestrator.process_video_with(url, options).await
    }

    /// Starts the periodic metrics reporter. Calling it twice is a no-op.
    pub fn start_metrics_reporter(&mut self) {
        if self.reporter.is_some() {
            return;
        }
        self.reporter = Some(spawn_metrics_reporter(
            self.telemetry.clone(),
            self.orchestrator.broadcaster().clone(),
            self.orchestrator.retry_engine().clone(),
            self.shutdown.child_token(),
            self.config.metrics_interval(),
        ));
    }

    /// Cancels in-flight runs and stops the reporter.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.shutdown.cancel();
        if let Some(handle) = self.reporter.take() {
            handle.await.context("metrics reporter task panicked")?;
        }
        self.shutdown = CancellationToken::new();
        tracing::info!("engine shut down");
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("reporter_running", &self.reporter.is_some())
            .finish()
    }
}
