//! Live progress of in-flight runs, fanned out to any number of observers.

pub mod broadcaster;
pub mod record;

pub use broadcaster::{StatusBroadcaster, StatusSubscription, DEFAULT_HISTORY_CAPACITY};
pub use record::{StatusPhase, StatusRecord};
