pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod resilience;
pub mod runtime;
pub mod services;
pub mod status;

pub use credentials::{TokenInfo, TokenManager};
pub use error::{ErrorKind, ServiceError, UserMessage};
pub use pipeline::{
    CurrentStatus, OrchestrationError, Orchestrator, PipelineSettings, RunId, RunOptions, Stage,
    TranscriptHandle,
};
pub use resilience::{CircuitBreakerSnapshot, CircuitState, RetryEngine, RetryPolicy};
pub use runtime::config::{EngineConfig, EngineConfigBuilder, EngineConfigParams};
pub use runtime::engine::Engine;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use services::{
    CreditClient, HttpBackend, HttpBackendOptions, Identity, JobId, JobPhase, JobPoller,
    JobStatus, JobSubmitter, LivenessClient, ServiceClients, TokenVendor, TranscriptSink,
    VendedToken,
};
pub use status::{StatusBroadcaster, StatusPhase, StatusRecord, StatusSubscription};
