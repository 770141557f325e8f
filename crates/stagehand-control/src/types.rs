//! Core types and value objects for the control plane.
//!
//! Defines actions, their lifecycle enumerations, audit entries, and the
//! summary records returned by queue reads.

use serde::{Deserialize, Serialize};
use stagehand_core::types::{RiskLevel, Timestamp};
use std::fmt;

/// Opaque key/value data attached to an action.
pub type Payload = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// Enums
// =============================================================================

/// Action lifecycle states.
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Ignored,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::Pending)
    }

    /// Parse a status filter; unknown labels yield `None` (no filter).
    pub fn parse_filter(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Pending => write!(f, "pending"),
            ActionStatus::Approved => write!(f, "approved"),
            ActionStatus::Rejected => write!(f, "rejected"),
            ActionStatus::Ignored => write!(f, "ignored"),
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(ActionStatus::Pending),
            "approved" => Ok(ActionStatus::Approved),
            "rejected" => Ok(ActionStatus::Rejected),
            "ignored" => Ok(ActionStatus::Ignored),
            _ => Err(format!("Unknown action status: {}", s)),
        }
    }
}

/// Recorded decision on an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDecision {
    #[default]
    #[serde(rename = "")]
    None,
    Approve,
    Reject,
    AutoIgnore,
}

impl fmt::Display for ActionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionDecision::None => write!(f, ""),
            ActionDecision::Approve => write!(f, "approve"),
            ActionDecision::Reject => write!(f, "reject"),
            ActionDecision::AutoIgnore => write!(f, "auto_ignore"),
        }
    }
}

// =============================================================================
// Domain Structs
// =============================================================================

/// One entry in an append-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: String,
    pub event: String,
    pub by: String,
    pub note: String,
}

impl AuditEntry {
    pub fn new(ts: Timestamp, event: &str, by: &str, note: &str) -> Self {
        Self {
            ts: ts.to_iso(),
            event: event.to_string(),
            by: by.to_string(),
            note: note.to_string(),
        }
    }
}

/// A unit of agent work awaiting or having received a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub kind: String,
    pub risk: RiskLevel,
    pub title: String,
    pub body: String,
    pub payload: Payload,
    pub status: ActionStatus,
    pub decision: ActionDecision,
    pub decision_note: String,
    pub created_by: String,
    pub created_at: String,
    pub created_epoch: i64,
    pub updated_at: String,
    pub updated_epoch: i64,
    pub audit: Vec<AuditEntry>,
}

impl Action {
    /// Age in seconds at `now`.
    pub fn age_seconds(&self, now: Timestamp) -> i64 {
        now.0 - self.created_epoch
    }

    pub(crate) fn touch(&mut self, now: Timestamp) {
        self.updated_at = now.to_iso();
        self.updated_epoch = now.0;
    }
}

/// Request to enqueue a new action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAction {
    pub kind: String,
    pub risk: RiskLevel,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub payload: Payload,
    pub created_by: String,
}

impl NewAction {
    pub fn new(kind: &str, risk: RiskLevel, title: &str, body: &str) -> Self {
        Self {
            kind: kind.to_string(),
            risk,
            title: title.to_string(),
            body: body.to_string(),
            payload: Payload::new(),
            created_by: String::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn created_by(mut self, who: &str) -> Self {
        self.created_by = who.to_string();
        self
    }
}

/// Status counts over the whole queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub ignored: usize,
    pub total: usize,
}

impl QueueSummary {
    pub(crate) fn count(&mut self, status: ActionStatus) {
        match status {
            ActionStatus::Pending => self.pending += 1,
            ActionStatus::Approved => self.approved += 1,
            ActionStatus::Rejected => self.rejected += 1,
            ActionStatus::Ignored => self.ignored += 1,
        }
        self.total += 1;
    }
}

/// Result of a `list_actions` read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionList {
    /// Newest first.
    pub items: Vec<Action>,
    pub summary: QueueSummary,
    /// Items auto-ignored by the TTL sweep of this call.
    pub expired: Vec<Action>,
}

/// Decision activity over the trailing 60 minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueWindow {
    /// Created within the window and still pending.
    pub pending_created: usize,
    pub approved: usize,
    pub rejected: usize,
    pub ignored: usize,
    pub decisions_total: usize,
    /// Percentage of window decisions that were ignores.
    pub ignored_rate: f64,
}

/// Queue section of the aggregate runtime snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueRuntimeSnapshot {
    pub queue: QueueSummary,
    pub queue_window_60m: QueueWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_status_display_from_str() {
        for variant in [
            ActionStatus::Pending,
            ActionStatus::Approved,
            ActionStatus::Rejected,
            ActionStatus::Ignored,
        ] {
            let parsed: ActionStatus = variant.to_string().parse().unwrap();
            assert_eq!(parsed, variant);
        }
        assert!("expired".parse::<ActionStatus>().is_err());
    }

    #[test]
    fn test_action_status_terminal() {
        assert!(!ActionStatus::Pending.is_terminal());
        assert!(ActionStatus::Approved.is_terminal());
        assert!(ActionStatus::Rejected.is_terminal());
        assert!(ActionStatus::Ignored.is_terminal());
    }

    #[test]
    fn test_status_filter_ignores_unknown() {
        assert_eq!(ActionStatus::parse_filter(Some("Pending")), Some(ActionStatus::Pending));
        assert_eq!(ActionStatus::parse_filter(Some("bogus")), None);
        assert_eq!(ActionStatus::parse_filter(None), None);
    }

    #[test]
    fn test_decision_serializes_as_wire_strings() {
        assert_eq!(serde_json::to_string(&ActionDecision::None).unwrap(), "\"\"");
        assert_eq!(serde_json::to_string(&ActionDecision::Approve).unwrap(), "\"approve\"");
        assert_eq!(serde_json::to_string(&ActionDecision::AutoIgnore).unwrap(), "\"auto_ignore\"");
        let rt: ActionDecision = serde_json::from_str("\"\"").unwrap();
        assert_eq!(rt, ActionDecision::None);
    }

    #[test]
    fn test_audit_entry_uses_iso_timestamp() {
        let entry = AuditEntry::new(Timestamp(0), "created", "tester", "");
        assert_eq!(entry.ts, "1970-01-01T00:00:00Z");
        assert_eq!(entry.event, "created");
    }

    #[test]
    fn test_queue_summary_count() {
        let mut summary = QueueSummary::default();
        summary.count(ActionStatus::Pending);
        summary.count(ActionStatus::Pending);
        summary.count(ActionStatus::Ignored);
        assert_eq!(summary.pending, 2);
        assert_eq!(summary.ignored, 1);
        assert_eq!(summary.total, 3);
    }

    #[test]
    fn test_new_action_builder() {
        let mut payload = Payload::new();
        payload.insert("goal_id".to_string(), serde_json::json!("chat_pulse"));
        let req = NewAction::new("goal", RiskLevel::AutoChat, "t", "b")
            .with_payload(payload)
            .created_by("scheduler");
        assert_eq!(req.created_by, "scheduler");
        assert_eq!(req.payload["goal_id"], "chat_pulse");
    }
}
