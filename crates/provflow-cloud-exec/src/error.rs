//! Exec provider error types

use provflow_cloud::ProviderError;
use std::time::Duration;
use thiserror::Error;

/// Exit status shells use for "temporary failure, try again" (EX_TEMPFAIL)
pub const EXIT_TEMPFAIL: i32 = 75;

/// Exit status a command can use to report that the resource does not exist
pub const EXIT_NOT_FOUND: i32 = 44;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Shell not found: {0}")]
    ShellNotFound(String),

    #[error("No '{operation}' command configured for kind '{kind}'")]
    MissingCommand { kind: String, operation: String },

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command exited with status {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("Unexpected command output: {0}")]
    UnexpectedOutput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ExecError {
    /// Whether the failure is worth retrying
    fn is_transient(&self) -> bool {
        match self {
            ExecError::Timeout(_) => true,
            ExecError::CommandFailed { code, stderr } => {
                *code == Some(EXIT_TEMPFAIL) || looks_transient(stderr)
            }
            _ => false,
        }
    }

    fn is_not_found(&self) -> bool {
        match self {
            ExecError::CommandFailed { code, stderr } => {
                *code == Some(EXIT_NOT_FOUND) || looks_not_found(stderr)
            }
            _ => false,
        }
    }
}

fn looks_transient(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    [
        "throttl",
        "rate limit",
        "rate exceeded",
        "too many requests",
        "timed out",
        "timeout",
        "try again",
        "temporarily unavailable",
        "service unavailable",
    ]
    .iter()
    .any(|needle| stderr.contains(needle))
}

fn looks_not_found(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    ["not found", "notfound", "does not exist", "no such"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

impl From<ExecError> for ProviderError {
    fn from(err: ExecError) -> Self {
        if err.is_transient() {
            ProviderError::Transient(err.to_string())
        } else if err.is_not_found() {
            ProviderError::NotFound(err.to_string())
        } else {
            ProviderError::Permanent(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(code: i32, stderr: &str) -> ExecError {
        ExecError::CommandFailed {
            code: Some(code),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_classification() {
        assert!(matches!(
            ProviderError::from(failed(EXIT_TEMPFAIL, "")),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            ProviderError::from(failed(1, "An error occurred (Throttling): Rate exceeded")),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            ProviderError::from(failed(254, "InvalidVpcID.NotFound")),
            ProviderError::NotFound(_)
        ));
        assert!(matches!(
            ProviderError::from(failed(1, "UnauthorizedOperation")),
            ProviderError::Permanent(_)
        ));
        assert!(matches!(
            ProviderError::from(ExecError::Timeout(Duration::from_secs(1))),
            ProviderError::Transient(_)
        ));
    }
}
