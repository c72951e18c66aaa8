use crate::pipeline::{RunId, Stage};
use tokio::time::Instant;

/// Coarse lifecycle of a record, for observers that do not care about stages.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatusPhase {
    Pending,
    Active,
    Terminal,
}

/// Published view of one run at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusRecord {
    pub run_id: RunId,
    pub title: String,
    pub detail: String,
    pub stage: Stage,
    pub progress_percent: u8,
    pub updated_at: Instant,
}

impl StatusRecord {
    pub fn new(run_id: RunId, stage: Stage, progress: f64, detail: impl Into<String>) -> Self {
        Self {
            run_id,
            title: stage.title().to_owned(),
            detail: detail.into(),
            stage,
            progress_percent: percent_from_fraction(progress),
            updated_at: Instant::now(),
        }
    }

    pub fn phase(&self) -> StatusPhase {
        match self.stage {
            Stage::Idle => StatusPhase::Pending,
            stage if stage.is_terminal() => StatusPhase::Terminal,
            _ => StatusPhase::Active,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

fn percent_from_fraction(progress: f64) -> u8 {
    if !progress.is_finite() {
        return 0;
    }
    (progress.clamp(0.0, 1.0) * 100.0).round() as u8
}
