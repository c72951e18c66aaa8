//! Contracts of the remote collaborators the pipeline drives, their payload
//! types, and an HTTP implementation of all of them.
//!
//! Each trait is a single request/response operation. Implementations report
//! failures as [`ServiceError`] so the retry engine can classify them; they
//! never retry on their own.

pub mod http;
pub mod types;

use crate::error::ServiceError;
use crate::pipeline::TranscriptHandle;
use futures::future::BoxFuture;
use std::sync::Arc;

pub use http::{HttpBackend, HttpBackendOptions};
pub use types::{Identity, JobId, JobPhase, JobStatus, VendedToken};

pub trait LivenessClient: Send + Sync {
    /// Returns the service's self-reported status string.
    fn check_health(&self) -> BoxFuture<'_, Result<String, ServiceError>>;
}

pub trait CreditClient: Send + Sync {
    fn balance<'a>(&'a self, identity: &'a Identity) -> BoxFuture<'a, Result<i64, ServiceError>>;
}

pub trait TokenVendor: Send + Sync {
    /// Spends one credit and returns a short-lived token.
    fn vend<'a>(
        &'a self,
        identity: &'a Identity,
        client_request_id: &'a str,
    ) -> BoxFuture<'a, Result<VendedToken, ServiceError>>;
}

pub trait JobSubmitter: Send + Sync {
    fn submit<'a>(&'a self, token: &'a str, url: &'a str)
        -> BoxFuture<'a, Result<JobId, ServiceError>>;
}

pub trait JobPoller: Send + Sync {
    fn poll<'a>(
        &'a self,
        token: &'a str,
        job: &'a JobId,
    ) -> BoxFuture<'a, Result<JobStatus, ServiceError>>;
}

/// Receives finished transcripts for persistence outside the pipeline.
pub trait TranscriptSink: Send + Sync {
    fn store<'a>(&'a self, handle: &'a TranscriptHandle) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// The remote clients the orchestrator needs, injected at construction.
#[derive(Clone)]
pub struct ServiceClients {
    pub liveness: Arc<dyn LivenessClient>,
    pub credits: Arc<dyn CreditClient>,
    pub vendor: Arc<dyn TokenVendor>,
    pub submitter: Arc<dyn JobSubmitter>,
    pub poller: Arc<dyn JobPoller>,
}

impl ServiceClients {
    /// Uses one backend for every contract.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: LivenessClient + CreditClient + TokenVendor + JobSubmitter + JobPoller + 'static,
    {
        Self {
            liveness: backend.clone(),
            credits: backend.clone(),
            vendor: backend.clone(),
            submitter: backend.clone(),
            poller: backend,
        }
    }
}
