use std::time::Duration;
use thiserror::Error;

use crate::remote::RemoteUiError;
use crate::retry::AttemptTimedOut;

/// Error returned by a single stage attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// Network hiccup or slow page; worth another attempt
    #[error("{0}")]
    Transient(String),

    /// The portal refused the action (bad credentials, rejected submission)
    #[error("rejected: {0}")]
    Rejected(String),

    /// The browser session went away
    #[error("session closed: {0}")]
    SessionClosed(String),

    #[error("stage attempt timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

/// Error taxonomy used when a stage error reaches the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    TerminalError,
    Indeterminate,
}

impl StageError {
    pub fn transient(message: impl Into<String>) -> Self {
        StageError::Transient(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        StageError::Rejected(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StageError::Transient(_) | StageError::TimedOut(_))
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            StageError::Transient(_) | StageError::TimedOut(_) => ErrorClass::Transient,
            StageError::Rejected(_) => ErrorClass::TerminalError,
            StageError::SessionClosed(_) => ErrorClass::Indeterminate,
        }
    }
}

impl From<AttemptTimedOut> for StageError {
    fn from(err: AttemptTimedOut) -> Self {
        StageError::TimedOut(err.0)
    }
}

impl From<RemoteUiError> for StageError {
    fn from(err: RemoteUiError) -> Self {
        match err {
            RemoteUiError::SessionClosed => StageError::SessionClosed(err.to_string()),
            other => StageError::Transient(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(StageError::transient("slow").class(), ErrorClass::Transient);
        assert_eq!(
            StageError::TimedOut(Duration::from_secs(1)).class(),
            ErrorClass::Transient
        );
        assert_eq!(StageError::rejected("bad pin").class(), ErrorClass::TerminalError);
        assert_eq!(
            StageError::SessionClosed("gone".into()).class(),
            ErrorClass::Indeterminate
        );
    }

    #[test]
    fn test_remote_errors_map_to_stage_errors() {
        assert!(matches!(
            StageError::from(RemoteUiError::SessionClosed),
            StageError::SessionClosed(_)
        ));
        assert!(StageError::from(RemoteUiError::Navigation("dns".into())).is_transient());
    }
}
