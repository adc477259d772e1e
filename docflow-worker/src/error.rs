//! Task failure taxonomy
//!
//! Every handler returns a [`TaskError`]; the dispatcher consults
//! [`TaskError::is_retriable`] to choose between scheduling a retry and
//! archiving the task.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Transient failure patterns (network, timeouts, overload)
static TRANSIENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)connection (refused|reset|closed|aborted)|timeout|timed out|deadline exceeded|\b(429|502|503|504)\b|bad gateway|service unavailable|too many requests|\bdns\b|no such host|failed to lookup address|network (is )?unreachable|broken pipe|\beof\b|unexpected end of file|database is locked",
    )
    .expect("transient error pattern is valid")
});

/// Result type for task handlers
pub type TaskResult<T> = std::result::Result<T, TaskError>;

#[derive(Error, Debug)]
pub enum TaskError {
    /// Malformed task body; never retried
    #[error("Invalid payload: {0}")]
    Payload(String),

    /// Network-class failure; retried under the task type's schedule
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Application failure; terminal after the current attempt
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Interrupted by shutdown or timeout before completing
    #[error("Task cancelled")]
    Cancelled,
}

impl TaskError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, TaskError::Transient(_) | TaskError::Cancelled)
    }

    /// Wrap an error message, classifying it as transient or permanent
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        match classify_error(&message) {
            ErrorClass::Transient => TaskError::Transient(message),
            ErrorClass::Permanent => TaskError::Permanent(message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Classify an error message against the transient pattern set
pub fn classify_error(message: &str) -> ErrorClass {
    if TRANSIENT_PATTERN.is_match(message) {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

impl From<docflow_common::Error> for TaskError {
    fn from(err: docflow_common::Error) -> Self {
        use docflow_common::Error;
        match &err {
            Error::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_),
            ) => TaskError::Transient(err.to_string()),
            Error::InvalidInput(_) => TaskError::Payload(err.to_string()),
            _ => TaskError::classified(err.to_string()),
        }
    }
}
