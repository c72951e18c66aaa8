//! Runtime glue: validated configuration, telemetry, and the engine that
//! wires every component together.

pub mod config;
pub mod engine;
pub mod telemetry;

pub use config::{EngineConfig, EngineConfigBuilder, EngineConfigParams};
pub use engine::Engine;
pub use telemetry::{init_tracing, spawn_metrics_reporter, Telemetry, TelemetrySnapshot};
