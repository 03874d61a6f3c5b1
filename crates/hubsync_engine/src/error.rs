//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether a later run can be expected to succeed.
        retryable: bool,
    },

    /// The call exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The remote answered with a non-2xx status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// A response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The destination store rejected or failed a call.
    #[error("destination error: {0}")]
    Destination(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid phase transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current phase.
        from: String,
        /// Attempted target phase.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a status error, keeping at most 200 characters of the body.
    pub fn status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: body.chars().take(200).collect(),
        }
    }

    /// Returns true if the fault is expected to clear on a later run.
    ///
    /// The engine never retries within a run; this only feeds diagnostics.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_transient());
        assert!(!SyncError::transport_fatal("bad certificate").is_transient());
        assert!(SyncError::Timeout.is_transient());
        assert!(SyncError::status(503, "unavailable").is_transient());
        assert!(SyncError::status(429, "slow down").is_transient());
        assert!(!SyncError::status(401, "unauthorized").is_transient());
        assert!(!SyncError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn status_body_is_truncated() {
        let long = "x".repeat(1000);
        match SyncError::status(500, &long) {
            SyncError::Status { body, .. } => assert_eq!(body.len(), 200),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_display() {
        let err = SyncError::status(404, "not found");
        assert_eq!(err.to_string(), "unexpected status 404: not found");
        assert_eq!(SyncError::Timeout.to_string(), "operation timed out");
    }
}
