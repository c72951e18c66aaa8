//! The staged run state machine: health, credit, token, submit, poll.

pub mod orchestrator;
pub mod outcome;
pub mod progress;
pub mod run;
pub mod stage;

pub use orchestrator::{Orchestrator, PipelineSettings, MAX_URL_BYTES};
pub use outcome::{OrchestrationError, TranscriptHandle};
pub use progress::{CurrentStatus, ProgressTracker};
pub use run::{Run, RunId, RunOptions};
pub use stage::Stage;
