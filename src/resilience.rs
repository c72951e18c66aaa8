//! Resilience plumbing wrapped around every remote call: retry policy,
//! per-family circuit breakers, counters, and the retry loop itself.

pub mod circuit_breaker;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot, CircuitState, Permit};
pub use metrics::RetryMetricsSnapshot;
pub use policy::RetryPolicy;
pub use registry::BreakerRegistry;
pub use retry::RetryEngine;

/// Operation family names used by the pipeline.
pub mod families {
    pub const HEALTH: &str = "health";
    pub const CREDIT_BALANCE: &str = "credit-balance";
    pub const TOKEN_VEND: &str = "token-vend";
    pub const JOB_SUBMIT: &str = "job-submit";
    pub const JOB_POLL: &str = "job-poll";
}
