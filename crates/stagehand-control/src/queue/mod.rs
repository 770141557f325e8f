//! Human-review action queue.
//!
//! Bounded, insertion-ordered store of actions with a one-way decision
//! lifecycle and lazy TTL expiry. Every read sweeps expired pending items
//! before answering, so no background timer is needed.

pub mod state_machine;

use crate::error::ControlError;
use crate::queue::state_machine::validate_transition;
use crate::types::{
    Action, ActionDecision, ActionList, ActionStatus, AuditEntry, NewAction, QueueRuntimeSnapshot,
    QueueSummary, QueueWindow,
};
use stagehand_core::id::IdAllocator;
use stagehand_core::types::{clip_text, Timestamp};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const DEFAULT_CAPACITY: usize = 400;
pub const DEFAULT_TTL_SECS: u64 = 900;
pub const MIN_TTL_SECS: u64 = 60;
pub const LIST_LIMIT_MAX: usize = 300;

const WINDOW_SECS: i64 = 3600;
const KIND_MAX_CHARS: usize = 64;
const TITLE_MAX_CHARS: usize = 160;
const BODY_MAX_CHARS: usize = 2000;
const NOTE_MAX_CHARS: usize = 500;
const ACTOR_MAX_CHARS: usize = 64;

#[derive(Default)]
struct QueueState {
    order: VecDeque<String>,
    items: HashMap<String, Action>,
}

/// In-memory action queue guarded by a single lock.
pub struct ActionQueue {
    capacity: usize,
    ids: IdAllocator,
    state: Mutex<QueueState>,
}

impl ActionQueue {
    /// Create an empty queue holding at most `capacity` actions (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            ids: IdAllocator::new(),
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Reads and enqueues stay available even if another caller panicked
    // while holding the lock.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a new pending action, evicting the oldest one if full.
    pub fn enqueue_action(&self, req: NewAction, now: Timestamp) -> Action {
        let kind = non_empty(clip_text(&req.kind, KIND_MAX_CHARS), "generic");
        let created_by = non_empty(clip_text(&req.created_by, ACTOR_MAX_CHARS), "agent");

        // Minted under the lock so counter order matches insertion order.
        let mut state = self.lock();
        let action = Action {
            id: self.ids.next("act"),
            kind,
            risk: req.risk,
            title: clip_text(&req.title, TITLE_MAX_CHARS),
            body: clip_text(&req.body, BODY_MAX_CHARS),
            payload: req.payload,
            status: ActionStatus::Pending,
            decision: ActionDecision::None,
            decision_note: String::new(),
            audit: vec![AuditEntry::new(now, "created", &created_by, "")],
            created_by,
            created_at: now.to_iso(),
            created_epoch: now.0,
            updated_at: now.to_iso(),
            updated_epoch: now.0,
        };

        while state.order.len() >= self.capacity {
            match state.order.pop_front() {
                Some(evicted) => {
                    state.items.remove(&evicted);
                    tracing::debug!(action_id = %evicted, "Evicted oldest action");
                }
                None => break,
            }
        }
        state.order.push_back(action.id.clone());
        state.items.insert(action.id.clone(), action.clone());

        tracing::debug!(
            action_id = %action.id,
            kind = %action.kind,
            risk = %action.risk,
            "Action enqueued"
        );
        action
    }

    /// Record a human decision on a pending action.
    ///
    /// `decision` must be `approve` or `reject` (case-insensitive).
    pub fn decide_action(
        &self,
        action_id: &str,
        decision: &str,
        note: &str,
        decided_by: &str,
        now: Timestamp,
    ) -> Result<Action, ControlError> {
        let action_id = action_id.trim();
        if action_id.is_empty() {
            return Err(ControlError::InvalidArgument("action_id is required".to_string()));
        }

        let mut state = self.state.lock().map_err(|e| ControlError::LockPoisoned(e.to_string()))?;
        let action = state
            .items
            .get_mut(action_id)
            .ok_or_else(|| ControlError::NotFound(action_id.to_string()))?;

        let (status, decision) = match decision.trim().to_ascii_lowercase().as_str() {
            "approve" => (ActionStatus::Approved, ActionDecision::Approve),
            "reject" => (ActionStatus::Rejected, ActionDecision::Reject),
            other => {
                return Err(ControlError::InvalidArgument(format!(
                    "decision must be approve or reject, got '{}'",
                    other
                )))
            }
        };

        validate_transition(action.status, status).map_err(|_| {
            ControlError::Conflict(format!("action {} is already {}", action.id, action.status))
        })?;

        let decided_by = non_empty(clip_text(decided_by, ACTOR_MAX_CHARS), "operator");
        let note = clip_text(note, NOTE_MAX_CHARS);
        action.status = status;
        action.decision = decision;
        action.decision_note = note.clone();
        action.touch(now);
        action
            .audit
            .push(AuditEntry::new(now, &status.to_string(), &decided_by, &note));

        tracing::debug!(
            action_id = %action.id,
            status = %status,
            by = %decided_by,
            "Action decided"
        );
        Ok(action.clone())
    }

    /// Sweep expired pending actions, returning the ones just ignored.
    pub fn expire_stale(&self, ttl_seconds: u64, now: Timestamp) -> Vec<Action> {
        let mut state = self.lock();
        sweep_expired(&mut state, ttl_seconds, now)
    }

    /// List actions newest-first, optionally filtered by status.
    ///
    /// `limit` is clamped to `[1, 300]`; the summary always covers the
    /// whole queue.
    pub fn list_actions(
        &self,
        status: Option<ActionStatus>,
        limit: usize,
        ttl_seconds: u64,
        now: Timestamp,
    ) -> ActionList {
        let mut state = self.lock();
        let expired = sweep_expired(&mut state, ttl_seconds, now);
        let limit = limit.clamp(1, LIST_LIMIT_MAX);

        let items = state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.items.get(id))
            .filter(|a| status.map_or(true, |s| a.status == s))
            .take(limit)
            .cloned()
            .collect();

        ActionList {
            items,
            summary: summarize(&state),
            expired,
        }
    }

    /// Look up one action after the TTL sweep.
    pub fn get_action(&self, action_id: &str, ttl_seconds: u64, now: Timestamp) -> Option<Action> {
        let mut state = self.lock();
        sweep_expired(&mut state, ttl_seconds, now);
        state.items.get(action_id.trim()).cloned()
    }

    /// Whole-queue summary plus the trailing 60-minute decision window.
    pub fn runtime_snapshot(&self, ttl_seconds: u64, now: Timestamp) -> QueueRuntimeSnapshot {
        let mut state = self.lock();
        sweep_expired(&mut state, ttl_seconds, now);

        let window_start = now.0 - WINDOW_SECS;
        let mut window = QueueWindow::default();
        for action in state.items.values() {
            match action.status {
                ActionStatus::Pending => {
                    if action.created_epoch >= window_start {
                        window.pending_created += 1;
                    }
                }
                status if action.updated_epoch >= window_start => match status {
                    ActionStatus::Approved => window.approved += 1,
                    ActionStatus::Rejected => window.rejected += 1,
                    _ => window.ignored += 1,
                },
                _ => {}
            }
        }
        window.decisions_total = window.approved + window.rejected + window.ignored;
        window.ignored_rate = if window.decisions_total == 0 {
            0.0
        } else {
            let rate = window.ignored as f64 / window.decisions_total as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        };

        QueueRuntimeSnapshot {
            queue: summarize(&state),
            queue_window_60m: window,
        }
    }
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

fn non_empty(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn summarize(state: &QueueState) -> QueueSummary {
    let mut summary = QueueSummary::default();
    for action in state.items.values() {
        summary.count(action.status);
    }
    summary
}

fn sweep_expired(state: &mut QueueState, ttl_seconds: u64, now: Timestamp) -> Vec<Action> {
    let ttl = ttl_seconds.max(MIN_TTL_SECS) as i64;
    let mut expired = Vec::new();
    for id in state.order.iter() {
        let Some(action) = state.items.get_mut(id) else {
            continue;
        };
        if action.status == ActionStatus::Pending
            && action.age_seconds(now) > ttl
            && validate_transition(action.status, ActionStatus::Ignored).is_ok()
        {
            action.status = ActionStatus::Ignored;
            action.decision = ActionDecision::AutoIgnore;
            action.touch(now);
            action.audit.push(AuditEntry::new(
                now,
                "ignored_timeout",
                "system",
                &format!("pending longer than {}s", ttl),
            ));
            tracing::debug!(action_id = %action.id, "Action auto-ignored after TTL");
            expired.push(action.clone());
        }
    }
    expired
}
