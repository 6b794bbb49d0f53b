//! Provisioning error types

use std::time::Duration;
use thiserror::Error;

/// Errors reported by a provider adapter
///
/// The split between transient and permanent drives the retry policy:
/// only transient errors are retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Timeouts, throttling, rate limits
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Bad parameters, permission denied, quota exhausted
    #[error("Permanent provider error: {0}")]
    Permanent(String),

    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Orchestration errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Gave up on '{resource}' after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        resource: String,
        attempts: u32,
        last_error: ProviderError,
    },

    #[error("Resource '{resource}' was not ready within {timeout:?}")]
    ReadinessTimeout { resource: String, timeout: Duration },

    #[error("Resource '{resource}' reported an error while provisioning: {reason}")]
    ReadinessFailed { resource: String, reason: String },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Run deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("Failed to delete '{resource}' during rollback: {message}")]
    Rollback { resource: String, message: String },

    #[error("Invalid state transition for '{resource}': {from} -> {to}")]
    InvalidTransition {
        resource: String,
        from: String,
        to: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ProviderError::transient("throttled").is_retryable());
        assert!(!ProviderError::permanent("denied").is_retryable());
        assert!(!ProviderError::NotFound("vpc-1".into()).is_retryable());
    }

    #[test]
    fn test_timeout_message_names_resource() {
        let err = CloudError::ReadinessTimeout {
            resource: "db".into(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "Resource 'db' was not ready within 30s");
    }
}
