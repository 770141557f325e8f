//! Error types for the control plane.

use stagehand_core::error::StagehandError;

/// Errors returned by control plane operations.
///
/// The components never log these; mapping them to user-facing results is
/// the caller's job.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
    #[error(transparent)]
    Core(#[from] StagehandError),
}

impl ControlError {
    /// Short machine-readable code, e.g. `not_found`.
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::InvalidArgument(_) => "invalid_argument",
            ControlError::NotFound(_) => "not_found",
            ControlError::Conflict(_) => "conflict",
            ControlError::LockPoisoned(_) => "lock_poisoned",
            ControlError::Core(_) => "internal",
        }
    }

    /// HTTP-style status a request layer would map this to.
    pub fn status_code(&self) -> u16 {
        match self {
            ControlError::InvalidArgument(_) => 400,
            ControlError::NotFound(_) => 404,
            ControlError::Conflict(_) => 409,
            ControlError::LockPoisoned(_) | ControlError::Core(_) => 500,
        }
    }
}

/// Errors reported by a chat dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatch failed: {0}")]
    Failed(String),
    #[error("Dispatcher unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_error_display() {
        let err = ControlError::InvalidArgument("decision must be approve or reject".to_string());
        assert_eq!(err.to_string(), "Invalid argument: decision must be approve or reject");

        let err = ControlError::NotFound("act_1_1".to_string());
        assert_eq!(err.to_string(), "Not found: act_1_1");

        let err = ControlError::Conflict("playbook_busy".to_string());
        assert_eq!(err.to_string(), "Conflict: playbook_busy");
    }

    #[test]
    fn test_control_error_codes() {
        let cases = [
            (ControlError::InvalidArgument(String::new()), "invalid_argument", 400),
            (ControlError::NotFound(String::new()), "not_found", 404),
            (ControlError::Conflict(String::new()), "conflict", 409),
            (ControlError::LockPoisoned(String::new()), "lock_poisoned", 500),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn test_control_error_from_core() {
        let core = StagehandError::Config("bad".to_string());
        let err: ControlError = core.into();
        assert!(matches!(err, ControlError::Core(_)));
        assert_eq!(err.to_string(), "Configuration error: bad");
        assert_eq!(err.code(), "internal");
    }

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::Failed("socket closed".to_string());
        assert_eq!(err.to_string(), "Dispatch failed: socket closed");
        let err = DispatchError::Unavailable("not connected".to_string());
        assert_eq!(err.to_string(), "Dispatcher unavailable: not connected");
    }
}
