//! Action state machine with validated transitions.
//!
//! Enforces the one-way action lifecycle:
//! Pending -> Approved | Rejected | Ignored

use crate::error::ControlError;
use crate::types::ActionStatus;

/// Validate that a status transition is allowed.
///
/// Only a pending action may move, and only to a terminal state.
pub fn validate_transition(from: ActionStatus, to: ActionStatus) -> Result<(), ControlError> {
    let valid = matches!(
        (from, to),
        (ActionStatus::Pending, ActionStatus::Approved)
            | (ActionStatus::Pending, ActionStatus::Rejected)
            | (ActionStatus::Pending, ActionStatus::Ignored)
    );

    if valid {
        Ok(())
    } else {
        Err(ControlError::Conflict(format!(
            "invalid action transition: {} -> {}",
            from, to
        )))
    }
}
