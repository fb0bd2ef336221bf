use std::time::Duration;

use thiserror::Error;

/// Failure of a wrapped operation, or of the policy running it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OperationError {
    #[error("operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Transient failure with no status code; retried by default.
    #[error("{0}")]
    Failed(String),

    /// Permanent failure; never retried by default.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("gave up after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<OperationError>,
    },
}

impl OperationError {
    pub fn failed(message: impl std::fmt::Display) -> Self {
        OperationError::Failed(message.to_string())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            OperationError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, OperationError::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationError::Cancelled)
    }

    /// The original failure behind any `RetryExhausted` wrapping.
    pub fn root_cause(&self) -> &OperationError {
        match self {
            OperationError::RetryExhausted { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            OperationError::RetryExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OperationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not expose the configured duration
            OperationError::Timeout(Duration::ZERO)
        } else if let Some(status) = e.status() {
            OperationError::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_builder() || e.is_decode() {
            OperationError::Rejected(e.to_string())
        } else {
            OperationError::Failed(e.to_string())
        }
    }
}
