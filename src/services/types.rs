use std::fmt;
use std::time::Duration;

/// Long-lived identity credential presented to the credit and vending
/// services. The bearer value is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: String,
    credential: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            credential: credential.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Raw vending response, before the token manager stamps an absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct VendedToken {
    pub token: String,
    pub scope: String,
    /// Lifetime reported by the vendor, if any.
    pub expires_in: Option<Duration>,
    pub balance_after: i64,
}

impl fmt::Debug for VendedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendedToken")
            .field("token", &"<redacted>")
            .field("scope", &self.scope)
            .field("expires_in", &self.expires_in)
            .field("balance_after", &self.balance_after)
            .finish()
    }
}

/// Identifier handed back by the job submitter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub phase: JobPhase,
    /// Completion percent reported by the poller, clamped to 0..=100.
    pub percent: Option<u8>,
    pub transcript: Option<String>,
    pub error: Option<String>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            phase: JobPhase::Pending,
            percent: None,
            transcript: None,
            error: None,
        }
    }

    pub fn pending_at(percent: u8) -> Self {
        Self {
            percent: Some(percent.min(100)),
            ..Self::pending()
        }
    }

    pub fn complete(transcript: impl Into<String>) -> Self {
        Self {
            phase: JobPhase::Complete,
            percent: Some(100),
            transcript: Some(transcript.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            phase: JobPhase::Failed,
            percent: None,
            transcript: None,
            error: Some(error.into()),
        }
    }
}
