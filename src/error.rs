//! Failure taxonomy shared by the resilience engine, the token manager and the
//! orchestrator. Every remote failure is mapped into [`ServiceError`] so the
//! retry classifier and the stage machine work on data rather than strings.

use std::fmt;
use std::time::Duration;

/// Stable, machine-readable category of a [`ServiceError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Server,
    Authentication,
    InsufficientCredits,
    Validation,
    CircuitOpen,
    TimeoutExceeded,
    Cancelled,
}

/// Human-facing rendering of an [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserMessage {
    pub title: &'static str,
    pub message: &'static str,
    pub retryable: bool,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Authentication => "AUTHENTICATION_ERROR",
            ErrorKind::InsufficientCredits => "INSUFFICIENT_CREDITS",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::CircuitOpen => "CIRCUIT_OPEN",
            ErrorKind::TimeoutExceeded => "TIMEOUT_EXCEEDED",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    /// Title, message and manual-retry hint suitable for end users.
    pub fn user_message(&self) -> UserMessage {
        match self {
            ErrorKind::Network => UserMessage {
                title: "Connection Problem",
                message: "Could not reach the transcription service. Check your connection and try again.",
                retryable: true,
            },
            ErrorKind::Server => UserMessage {
                title: "Service Unavailable",
                message: "The transcription service is temporarily unavailable. Please try again in a few moments.",
                retryable: true,
            },
            ErrorKind::Authentication => UserMessage {
                title: "Authentication Error",
                message: "Your session has expired. Please try again.",
                retryable: true,
            },
            ErrorKind::InsufficientCredits => UserMessage {
                title: "Insufficient Credits",
                message: "You don't have enough credits to complete this operation. Please add credits and try again.",
                retryable: false,
            },
            ErrorKind::Validation => UserMessage {
                title: "Invalid Request",
                message: "The request was rejected. Check the video URL and try again.",
                retryable: false,
            },
            ErrorKind::CircuitOpen => UserMessage {
                title: "Service Paused",
                message: "Too many recent failures; requests are paused briefly. Please try again shortly.",
                retryable: true,
            },
            ErrorKind::TimeoutExceeded => UserMessage {
                title: "Request Timed Out",
                message: "The transcription took too long to complete. Please try again.",
                retryable: true,
            },
            ErrorKind::Cancelled => UserMessage {
                title: "Cancelled",
                message: "The transcription was cancelled.",
                retryable: true,
            },
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error produced by a remote collaborator call or synthesised by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Connection failure, transport timeout, or an unreadable response.
    Network { message: String },
    /// 5xx or 429.
    Server { status: u16, message: String },
    /// 401.
    Authentication { message: String },
    /// 402, or the local credit guard refusing to vend.
    InsufficientCredits { message: String },
    /// Any other 4xx, or a locally rejected input.
    Validation { status: Option<u16>, message: String },
    /// The job itself reported a terminal failure while being polled.
    JobFailed { message: String },
    CircuitOpen { family: String },
    TimeoutExceeded { attempts: usize, elapsed: Duration },
    Cancelled,
}

impl ServiceError {
    pub fn network(message: impl Into<String>) -> Self {
        ServiceError::Network {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation {
            status: None,
            message: message.into(),
        }
    }

    pub fn insufficient_credits(message: impl Into<String>) -> Self {
        ServiceError::InsufficientCredits {
            message: message.into(),
        }
    }

    /// Maps a non-success HTTP status onto the taxonomy.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => ServiceError::Authentication { message },
            402 => ServiceError::InsufficientCredits { message },
            429 => ServiceError::Server { status, message },
            500..=599 => ServiceError::Server { status, message },
            _ => ServiceError::Validation {
                status: Some(status),
                message,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Network { .. } => ErrorKind::Network,
            ServiceError::Server { .. } | ServiceError::JobFailed { .. } => ErrorKind::Server,
            ServiceError::Authentication { .. } => ErrorKind::Authentication,
            ServiceError::InsufficientCredits { .. } => ErrorKind::InsufficientCredits,
            ServiceError::Validation { .. } => ErrorKind::Validation,
            ServiceError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            ServiceError::TimeoutExceeded { .. } => ErrorKind::TimeoutExceeded,
            ServiceError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Only transport failures and server-side overload are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Network { .. } | ServiceError::Server { .. }
        )
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Network { message } => write!(f, "network error: {message}"),
            ServiceError::Server { status, message } => {
                write!(f, "server error (HTTP {status}): {message}")
            }
            ServiceError::Authentication { message } => {
                write!(f, "authentication failed: {message}")
            }
            ServiceError::InsufficientCredits { message } => {
                write!(f, "insufficient credits: {message}")
            }
            ServiceError::Validation {
                status: Some(status),
                message,
            } => write!(f, "request rejected (HTTP {status}): {message}"),
            ServiceError::Validation {
                status: None,
                message,
            } => write!(f, "invalid request: {message}"),
            ServiceError::JobFailed { message } => write!(f, "transcription job failed: {message}"),
            ServiceError::CircuitOpen { family } => {
                write!(f, "circuit breaker for {family} is open")
            }
            ServiceError::TimeoutExceeded { attempts, elapsed } => write!(
                f,
                "job did not complete after {attempts} status checks ({:.1}s)",
                elapsed.as_secs_f64()
            ),
            ServiceError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for ServiceError {}
