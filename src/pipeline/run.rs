use super::stage::Stage;
use std::fmt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifier of one run. Generated as a UUID unless the caller supplies one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Per-invocation knobs for [`super::Orchestrator::process_video_with`].
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub run_id: Option<RunId>,
    pub cancellation: Option<CancellationToken>,
}

impl RunOptions {
    pub fn with_run_id(mut self, run_id: impl Into<RunId>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// State of one run, owned by the orchestrator task driving it.
#[derive(Debug)]
pub struct Run {
    id: RunId,
    url: String,
    stage: Stage,
    progress: f64,
    started_at: Instant,
}

impl Run {
    pub(crate) fn new(id: RunId, url: String) -> Self {
        Self {
            id,
            url,
            stage: Stage::Idle,
            progress: 0.0,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Moves to `stage`. Progress never moves backwards, and a terminal run
    /// does not change stage again.
    pub(crate) fn advance(&mut self, stage: Stage, progress: Option<f64>) {
        if self.stage.is_terminal() {
            return;
        }
        self.stage = stage;
        if let Some(progress) = progress {
            self.progress = self.progress.max(progress.clamp(0.0, 1.0));
        }
    }

    pub(crate) fn finish(&mut self, succeeded: bool) {
        let stage = if succeeded {
            Stage::Completed
        } else {
            Stage::Failed
        };
        self.advance(stage, stage.entry_progress());
    }
}
