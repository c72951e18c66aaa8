use super::run::RunId;
use super::stage::Stage;
use crate::error::{ErrorKind, ServiceError, UserMessage};
use crate::services::JobId;

/// Result of a completed run, handed to the caller and to the transcript sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptHandle {
    pub run_id: RunId,
    pub job_id: JobId,
    pub url: String,
    pub transcript: String,
}

/// Terminal failure of a run, tagged with the stage it failed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestrationError {
    stage: Stage,
    source: ServiceError,
}

impl OrchestrationError {
    pub fn new(stage: Stage, source: ServiceError) -> Self {
        Self { stage, source }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    /// Stable, machine-readable reason code.
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    pub fn user_message(&self) -> UserMessage {
        self.kind().user_message()
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    pub fn service_error(&self) -> &ServiceError {
        &self.source
    }

    pub fn into_source(self) -> ServiceError {
        self.source
    }
}

impl std::fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "run failed at {}: {}", self.stage, self.source)
    }
}

impl std::error::Error for OrchestrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
