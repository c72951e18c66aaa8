use std::fmt;

/// One step of the fixed-order run state machine. Declaration order is the
/// order of forward progress.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Idle,
    HealthCheck,
    CreditCheck,
    TokenVending,
    TranscriptionSubmission,
    PollingCompletion,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "IDLE",
            Stage::HealthCheck => "HEALTH_CHECK",
            Stage::CreditCheck => "CREDIT_CHECK",
            Stage::TokenVending => "TOKEN_VENDING",
            Stage::TranscriptionSubmission => "TRANSCRIPTION_SUBMISSION",
            Stage::PollingCompletion => "POLLING_COMPLETION",
            Stage::Completed => "COMPLETED",
            Stage::Failed => "FAILED",
        }
    }

    /// Short human-readable label used as the status record title.
    pub fn title(self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::HealthCheck => "Checking service health",
            Stage::CreditCheck => "Checking credits",
            Stage::TokenVending => "Obtaining access token",
            Stage::TranscriptionSubmission => "Submitting video",
            Stage::PollingCompletion => "Transcribing",
            Stage::Completed => "Transcript ready",
            Stage::Failed => "Transcription failed",
        }
    }

    /// Progress fraction published on entering the stage. `Failed` has none
    /// of its own; a failed run keeps the progress it had reached.
    pub fn entry_progress(self) -> Option<f64> {
        match self {
            Stage::Idle => Some(0.0),
            Stage::HealthCheck => Some(0.1),
            Stage::CreditCheck => Some(0.2),
            Stage::TokenVending => Some(0.3),
            Stage::TranscriptionSubmission => Some(0.4),
            Stage::PollingCompletion => Some(0.5),
            Stage::Completed => Some(1.0),
            Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
