//! Ops playbook engine.
//!
//! Each playbook walks `idle -> awaiting_decision -> cooldown -> idle`. A
//! run queues one action per step and only advances once a human approves
//! the waiting action. The engine never touches the queue directly; it goes
//! through an [`ActionPort`], so its lock is always taken before the queue's.

pub mod definitions;

use crate::error::ControlError;
use crate::playbook::definitions::{
    builtin_playbooks, render_template, Metrics, PlaybookDefinition,
};
use crate::types::{Action, ActionStatus, AuditEntry, NewAction, Payload};
use serde::{Deserialize, Serialize};
use serde_json::json;
use stagehand_core::id::IdAllocator;
use stagehand_core::types::{clip_text, Timestamp};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub const STEP_ACTION_KIND: &str = "ops_playbook_step";
pub const STEP_CREATED_BY: &str = "ops_playbook";
pub const AUDIT_CAP: usize = 30;

const REASON_MAX_CHARS: usize = 200;

/// Queue access used by the engine.
pub trait ActionPort {
    fn get_action(&self, action_id: &str, now: Timestamp) -> Option<Action>;
    fn enqueue_action(&self, req: NewAction, now: Timestamp) -> Action;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookState {
    #[default]
    Idle,
    AwaitingDecision,
    Cooldown,
}

impl fmt::Display for PlaybookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybookState::Idle => write!(f, "idle"),
            PlaybookState::AwaitingDecision => write!(f, "awaiting_decision"),
            PlaybookState::Cooldown => write!(f, "cooldown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookOutcome {
    #[default]
    NeverRun,
    Completed,
    Aborted,
}

/// Mutable state of one playbook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybookRuntime {
    pub state: PlaybookState,
    pub last_outcome: PlaybookOutcome,
    pub last_run_id: String,
    pub channel_id: String,
    pub last_started_at: Option<String>,
    pub last_started_epoch: Option<i64>,
    pub last_completed_at: Option<String>,
    pub last_completed_epoch: Option<i64>,
    pub trigger_reason: String,
    pub last_reason: String,
    pub current_step_index: Option<usize>,
    pub current_step_number: Option<usize>,
    pub current_step_title: String,
    pub waiting_action_id: String,
    pub last_action_status: String,
    pub cooldown_until: Option<String>,
    pub cooldown_until_epoch: Option<i64>,
    pub updated_at: Option<String>,
    pub updated_epoch: Option<i64>,
    /// Most recent entries only, oldest first.
    pub audit: Vec<AuditEntry>,
}

impl PlaybookRuntime {
    fn stamp(&mut self, now: Timestamp, event: &str, by: &str, note: &str) {
        self.updated_at = Some(now.to_iso());
        self.updated_epoch = Some(now.0);
        self.audit.push(AuditEntry::new(now, event, by, note));
        if self.audit.len() > AUDIT_CAP {
            let excess = self.audit.len() - AUDIT_CAP;
            self.audit.drain(..excess);
        }
    }
}

/// Definition plus current runtime, as returned by reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookView {
    pub definition: PlaybookDefinition,
    pub runtime: PlaybookRuntime,
}

/// One state change made during a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookTransition {
    pub playbook_id: String,
    pub run_id: String,
    pub event: String,
    pub reason: String,
}

/// Result of `evaluate` or `reconcile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookReport {
    pub generated_at: String,
    pub transitions: Vec<PlaybookTransition>,
    pub playbooks: Vec<PlaybookView>,
}

/// Metric-triggered remediation runner guarded by a single lock.
pub struct PlaybookEngine {
    definitions: Vec<PlaybookDefinition>,
    ids: IdAllocator,
    state: Mutex<HashMap<String, PlaybookRuntime>>,
}

impl PlaybookEngine {
    pub fn new(definitions: Vec<PlaybookDefinition>) -> Self {
        let runtimes = definitions
            .iter()
            .map(|d| (d.id.clone(), PlaybookRuntime::default()))
            .collect();
        Self {
            definitions,
            ids: IdAllocator::new(),
            state: Mutex::new(runtimes),
        }
    }

    pub fn definitions(&self) -> &[PlaybookDefinition] {
        &self.definitions
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PlaybookRuntime>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reconcile every playbook, then auto-start idle ones whose trigger
    /// and guard are satisfied by `metrics`.
    pub fn evaluate(
        &self,
        channel_id: &str,
        metrics: &Metrics,
        trigger_reason: &str,
        port: &dyn ActionPort,
        now: Timestamp,
    ) -> PlaybookReport {
        let mut runtimes = self.lock();
        let mut transitions = self.reconcile_all(&mut runtimes, metrics, port, now);

        for def in &self.definitions {
            let rt = runtimes.entry(def.id.clone()).or_default();
            if rt.state != PlaybookState::Idle || !def.should_auto_start(metrics) {
                continue;
            }
            let reason = match trigger_reason.trim() {
                "" => def.auto_reason(metrics),
                caller => format!("{}: {}", caller, def.auto_reason(metrics)),
            };
            let started = self.start(def, rt, channel_id, metrics, &reason, "system", port, now);
            transitions.push(started);
        }

        self.report(&runtimes, transitions, now)
    }

    /// Advance or abort runs whose waiting action has been decided.
    pub fn reconcile(
        &self,
        metrics: &Metrics,
        port: &dyn ActionPort,
        now: Timestamp,
    ) -> PlaybookReport {
        let mut runtimes = self.lock();
        let transitions = self.reconcile_all(&mut runtimes, metrics, port, now);
        self.report(&runtimes, transitions, now)
    }

    /// Start `playbook_id` by hand, ignoring its trigger threshold.
    ///
    /// A cooling-down playbook only starts with `force`; one awaiting a
    /// decision never does.
    #[allow(clippy::too_many_arguments)]
    pub fn trigger(
        &self,
        playbook_id: &str,
        channel_id: &str,
        metrics: &Metrics,
        trigger_reason: &str,
        force: bool,
        port: &dyn ActionPort,
        now: Timestamp,
    ) -> Result<PlaybookView, ControlError> {
        let playbook_id = playbook_id.trim();
        if playbook_id.is_empty() {
            return Err(ControlError::InvalidArgument("playbook_id is required".to_string()));
        }
        let def = self
            .definitions
            .iter()
            .find(|d| d.id == playbook_id)
            .ok_or_else(|| ControlError::NotFound(playbook_id.to_string()))?;

        let mut runtimes = self
            .state
            .lock()
            .map_err(|e| ControlError::LockPoisoned(e.to_string()))?;
        self.reconcile_all(&mut runtimes, metrics, port, now);

        let rt = runtimes.entry(def.id.clone()).or_default();
        match rt.state {
            PlaybookState::AwaitingDecision => {
                return Err(ControlError::Conflict("playbook_busy".to_string()));
            }
            PlaybookState::Cooldown if !force => {
                return Err(ControlError::Conflict("playbook_cooldown".to_string()));
            }
            _ => {}
        }

        let reason = match trigger_reason.trim() {
            "" => "manual".to_string(),
            r => r.to_string(),
        };
        self.start(def, rt, channel_id, metrics, &reason, "operator", port, now);
        Ok(PlaybookView {
            definition: def.clone(),
            runtime: rt.clone(),
        })
    }

    /// Definitions and runtimes. Only cooldown expiry is applied.
    pub fn snapshot(&self, now: Timestamp) -> Vec<PlaybookView> {
        let mut runtimes = self.lock();
        for rt in runtimes.values_mut() {
            expire_cooldown(rt, now);
        }
        self.views(&runtimes)
    }

    fn views(&self, runtimes: &HashMap<String, PlaybookRuntime>) -> Vec<PlaybookView> {
        self.definitions
            .iter()
            .map(|d| PlaybookView {
                definition: d.clone(),
                runtime: runtimes.get(&d.id).cloned().unwrap_or_default(),
            })
            .collect()
    }

    fn report(
        &self,
        runtimes: &HashMap<String, PlaybookRuntime>,
        transitions: Vec<PlaybookTransition>,
        now: Timestamp,
    ) -> PlaybookReport {
        PlaybookReport {
            generated_at: now.to_iso(),
            transitions,
            playbooks: self.views(runtimes),
        }
    }

    fn reconcile_all(
        &self,
        runtimes: &mut HashMap<String, PlaybookRuntime>,
        metrics: &Metrics,
        port: &dyn ActionPort,
        now: Timestamp,
    ) -> Vec<PlaybookTransition> {
        let mut transitions = Vec::new();
        for def in &self.definitions {
            let rt = runtimes.entry(def.id.clone()).or_default();
            expire_cooldown(rt, now);
            if rt.state != PlaybookState::AwaitingDecision {
                continue;
            }

            let waiting = port.get_action(&rt.waiting_action_id, now);
            let status = waiting.map(|a| a.status);
            rt.last_action_status = status.map_or_else(|| "missing".to_string(), |s| s.to_string());

            let change = match status {
                Some(ActionStatus::Pending) => None,
                Some(ActionStatus::Approved) => {
                    let next = rt.current_step_index.map_or(0, |i| i + 1);
                    if next < def.steps.len() {
                        let approved = rt.waiting_action_id.clone();
                        rt.stamp(now, "step_approved", "operator", &approved);
                        let channel = rt.channel_id.clone();
                        self.queue_step(def, rt, next, &channel, metrics, port, now);
                        Some(transition(def, rt, "step_advanced", ""))
                    } else {
                        Some(finish(def, rt, PlaybookOutcome::Completed, "all_steps_approved", now))
                    }
                }
                Some(ActionStatus::Rejected) => {
                    Some(finish(def, rt, PlaybookOutcome::Aborted, "step_rejected", now))
                }
                Some(ActionStatus::Ignored) => {
                    Some(finish(def, rt, PlaybookOutcome::Aborted, "step_ignored", now))
                }
                None => Some(finish(def, rt, PlaybookOutcome::Aborted, "step_missing", now)),
            };
            transitions.extend(change);
        }
        transitions
    }

    #[allow(clippy::too_many_arguments)]
    fn start(
        &self,
        def: &PlaybookDefinition,
        rt: &mut PlaybookRuntime,
        channel_id: &str,
        metrics: &Metrics,
        reason: &str,
        by: &str,
        port: &dyn ActionPort,
        now: Timestamp,
    ) -> PlaybookTransition {
        let reason = clip_text(reason, REASON_MAX_CHARS);
        let channel = channel_id.trim().to_string();
        rt.last_run_id = self.ids.next("run");
        rt.channel_id = channel.clone();
        rt.state = PlaybookState::AwaitingDecision;
        rt.trigger_reason = reason.clone();
        rt.last_reason = "started".to_string();
        rt.last_started_at = Some(now.to_iso());
        rt.last_started_epoch = Some(now.0);
        rt.cooldown_until = None;
        rt.cooldown_until_epoch = None;
        rt.stamp(now, "started", by, &reason);

        tracing::debug!(
            playbook_id = %def.id,
            run_id = %rt.last_run_id,
            reason = %reason,
            "Playbook started"
        );
        self.queue_step(def, rt, 0, &channel, metrics, port, now);
        transition(def, rt, "started", &reason)
    }

    #[allow(clippy::too_many_arguments)]
    fn queue_step(
        &self,
        def: &PlaybookDefinition,
        rt: &mut PlaybookRuntime,
        index: usize,
        channel_id: &str,
        metrics: &Metrics,
        port: &dyn ActionPort,
        now: Timestamp,
    ) {
        let Some(step) = def.steps.get(index) else {
            return;
        };
        let count = def.steps.len();
        let mut payload = Payload::new();
        payload.insert("playbook_id".to_string(), json!(def.id));
        payload.insert("run_id".to_string(), json!(rt.last_run_id));
        payload.insert("step_index".to_string(), json!(index));
        payload.insert("step_number".to_string(), json!(index + 1));
        payload.insert("step_count".to_string(), json!(count));
        payload.insert("channel_id".to_string(), json!(channel_id));
        payload.insert("trigger_reason".to_string(), json!(rt.trigger_reason));

        let req = NewAction::new(
            STEP_ACTION_KIND,
            def.risk,
            &format!("[{}] Step {}/{}: {}", def.name, index + 1, count, step.title),
            &render_template(&step.body, channel_id, &rt.trigger_reason, metrics),
        )
        .with_payload(payload)
        .created_by(STEP_CREATED_BY);
        let action = port.enqueue_action(req, now);

        rt.current_step_index = Some(index);
        rt.current_step_number = Some(index + 1);
        rt.current_step_title = step.title.clone();
        rt.waiting_action_id = action.id.clone();
        rt.last_action_status = action.status.to_string();
        rt.stamp(now, "step_queued", STEP_CREATED_BY, &action.id);
        tracing::debug!(
            playbook_id = %def.id,
            step = index + 1,
            action_id = %action.id,
            "Playbook step queued"
        );
    }
}

impl Default for PlaybookEngine {
    fn default() -> Self {
        Self::new(builtin_playbooks())
    }
}

fn transition(
    def: &PlaybookDefinition,
    rt: &PlaybookRuntime,
    event: &str,
    reason: &str,
) -> PlaybookTransition {
    PlaybookTransition {
        playbook_id: def.id.clone(),
        run_id: rt.last_run_id.clone(),
        event: event.to_string(),
        reason: reason.to_string(),
    }
}

fn finish(
    def: &PlaybookDefinition,
    rt: &mut PlaybookRuntime,
    outcome: PlaybookOutcome,
    reason: &str,
    now: Timestamp,
) -> PlaybookTransition {
    let until = now.plus_seconds(def.cooldown_seconds);
    rt.state = PlaybookState::Cooldown;
    rt.last_outcome = outcome;
    rt.last_reason = reason.to_string();
    rt.last_completed_at = Some(now.to_iso());
    rt.last_completed_epoch = Some(now.0);
    rt.cooldown_until = Some(until.to_iso());
    rt.cooldown_until_epoch = Some(until.0);
    rt.waiting_action_id.clear();

    let event = match outcome {
        PlaybookOutcome::Completed => "completed",
        _ => "aborted",
    };
    rt.stamp(now, event, "system", reason);
    tracing::debug!(
        playbook_id = %def.id,
        run_id = %rt.last_run_id,
        event,
        reason,
        "Playbook finished"
    );
    transition(def, rt, event, reason)
}

fn expire_cooldown(rt: &mut PlaybookRuntime, now: Timestamp) {
    let elapsed = rt.cooldown_until_epoch.map_or(true, |until| now.0 >= until);
    if rt.state == PlaybookState::Cooldown && elapsed {
        rt.state = PlaybookState::Idle;
        rt.cooldown_until = None;
        rt.cooldown_until_epoch = None;
        rt.stamp(now, "cooldown_finished", "system", "");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ActionQueue, DEFAULT_TTL_SECS};

    /// Port backed by a real queue, as the facade wires it.
    struct QueuePort<'a>(&'a ActionQueue);

    impl ActionPort for QueuePort<'_> {
        fn get_action(&self, action_id: &str, now: Timestamp) -> Option<Action> {
            self.0.get_action(action_id, DEFAULT_TTL_SECS, now)
        }
        fn enqueue_action(&self, req: NewAction, now: Timestamp) -> Action {
            self.0.enqueue_action(req, now)
        }
    }

    /// Port that forgets everything it enqueues.
    struct ForgetfulPort(ActionQueue);

    impl ActionPort for ForgetfulPort {
        fn get_action(&self, _action_id: &str, _now: Timestamp) -> Option<Action> {
            None
        }
        fn enqueue_action(&self, req: NewAction, now: Timestamp) -> Action {
            self.0.enqueue_action(req, now)
        }
    }

    fn metrics(pairs: &[(&str, f64)]) -> Metrics {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn runtime_of<'a>(views: &'a [PlaybookView], id: &str) -> &'a PlaybookRuntime {
        &views.iter().find(|v| v.definition.id == id).unwrap().runtime
    }

    #[test]
    fn test_backlog_playbook_full_run() {
        let queue = ActionQueue::new(50);
        let port = QueuePort(&queue);
        let engine = PlaybookEngine::default();
        let m = metrics(&[("queue_pending", 9.0), ("queue_target_pending", 3.0)]);

        let report = engine.evaluate("#main", &m, "scheduler_tick", &port, Timestamp(100));
        let rt = runtime_of(&report.playbooks, "queue_backlog_recovery");
        assert_eq!(rt.state, PlaybookState::AwaitingDecision);
        assert_eq!(rt.current_step_number, Some(1));
        assert!(rt.last_run_id.starts_with("run_"));
        assert_eq!(report.transitions.len(), 1);

        let step1 = queue
            .get_action(&rt.waiting_action_id, DEFAULT_TTL_SECS, Timestamp(100))
            .unwrap();
        assert_eq!(step1.kind, STEP_ACTION_KIND);
        assert_eq!(step1.created_by, STEP_CREATED_BY);
        assert_eq!(step1.payload["step_number"], json!(1));
        assert_eq!(step1.payload["step_count"], json!(2));
        assert_eq!(step1.payload["channel_id"], json!("#main"));
        assert!(step1.body.starts_with("9 actions are waiting in #main"));

        queue.decide_action(&step1.id, "approve", "", "op", Timestamp(100)).unwrap();
        let report = engine.reconcile(&m, &port, Timestamp(101));
        let rt = runtime_of(&report.playbooks, "queue_backlog_recovery");
        assert_eq!(rt.state, PlaybookState::AwaitingDecision);
        assert_eq!(rt.current_step_number, Some(2));
        assert_ne!(rt.waiting_action_id, step1.id);

        let step2_id = rt.waiting_action_id.clone();
        queue.decide_action(&step2_id, "approve", "", "op", Timestamp(101)).unwrap();
        let report = engine.reconcile(&m, &port, Timestamp(102));
        let rt = runtime_of(&report.playbooks, "queue_backlog_recovery");
        assert_eq!(rt.state, PlaybookState::Cooldown);
        assert_eq!(rt.last_outcome, PlaybookOutcome::Completed);
        assert_eq!(rt.last_reason, "all_steps_approved");
        assert_eq!(rt.cooldown_until_epoch, Some(102 + 900));
    }

    #[test]
    fn test_concurrent_evaluate_starts_once() {
        let queue = ActionQueue::new(50);
        let port = QueuePort(&queue);
        let engine = PlaybookEngine::default();
        let m = metrics(&[("queue_pending", 9.0)]);

        let started: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let report = engine.evaluate("#main", &m, "", &port, Timestamp(100));
                        report
                            .transitions
                            .iter()
                            .filter(|t| t.event == "started")
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(started, 1);
        assert_eq!(queue.len(), 1);
        let views = engine.snapshot(Timestamp(100));
        let rt = runtime_of(&views, "queue_backlog_recovery");
        assert_eq!(rt.state, PlaybookState::AwaitingDecision);
        let step = queue.get_action(&rt.waiting_action_id, DEFAULT_TTL_SECS, Timestamp(100));
        assert!(step.is_some());
    }

    #[test]
    fn test_guard_prevents_auto_start() {
        let queue = ActionQueue::new(50);
        let port = QueuePort(&queue);
        let engine = PlaybookEngine::default();
        let m = metrics(&[("queue_ignored_rate_60m", 80.0), ("queue_decisions_total_60m", 2.0)]);

        let report = engine.evaluate("#main", &m, "", &port, Timestamp(0));
        assert!(report.transitions.is_empty());
        let rt = runtime_of(&report.playbooks, "ignored_rate_guard");
        assert_eq!(rt.state, PlaybookState::Idle);
        assert_eq!(rt.last_outcome, PlaybookOutcome::NeverRun);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_rejection_aborts_into_cooldown_then_idle() {
        let queue = ActionQueue::new(50);
        let port = QueuePort(&queue);
        let engine = PlaybookEngine::default();
        let m = metrics(&[("queue_pending", 7.0)]);

        let view = engine
            .trigger("queue_backlog_recovery", "#main", &m, "", false, &port, Timestamp(0))
            .unwrap();
        assert_eq!(view.runtime.trigger_reason, "manual");
        queue
            .decide_action(&view.runtime.waiting_action_id, "reject", "", "op", Timestamp(1))
            .unwrap();

        let report = engine.reconcile(&m, &port, Timestamp(2));
        let rt = runtime_of(&report.playbooks, "queue_backlog_recovery");
        assert_eq!(rt.state, PlaybookState::Cooldown);
        assert_eq!(rt.last_outcome, PlaybookOutcome::Aborted);
        assert_eq!(rt.last_reason, "step_rejected");

        // Cooldown blocks auto-start.
        let report = engine.evaluate("#main", &m, "", &port, Timestamp(500));
        assert!(report.transitions.is_empty());

        let views = engine.snapshot(Timestamp(902));
        assert_eq!(runtime_of(&views, "queue_backlog_recovery").state, PlaybookState::Idle);
    }

    #[test]
    fn test_ttl_ignore_aborts_run() {
        let queue = ActionQueue::new(50);
        let port = QueuePort(&queue);
        let engine = PlaybookEngine::default();
        let m = metrics(&[("queue_pending", 6.0)]);

        engine.evaluate("#main", &m, "", &port, Timestamp(0));
        let report = engine.reconcile(&m, &port, Timestamp(901));
        let rt = runtime_of(&report.playbooks, "queue_backlog_recovery");
        assert_eq!(rt.last_reason, "step_ignored");
        assert_eq!(rt.last_action_status, "ignored");
    }

    #[test]
    fn test_missing_action_aborts_run() {
        let port = ForgetfulPort(ActionQueue::new(10));
        let engine = PlaybookEngine::default();
        let m = metrics(&[("queue_pending", 6.0)]);

        engine.evaluate("#main", &m, "", &port, Timestamp(0));
        let report = engine.reconcile(&m, &port, Timestamp(1));
        let rt = runtime_of(&report.playbooks, "queue_backlog_recovery");
        assert_eq!(rt.state, PlaybookState::Cooldown);
        assert_eq!(rt.last_reason, "step_missing");
        assert_eq!(rt.last_action_status, "missing");
    }

    #[test]
    fn test_pending_action_keeps_waiting() {
        let queue = ActionQueue::new(50);
        let port = QueuePort(&queue);
        let engine = PlaybookEngine::default();
        let m = metrics(&[("queue_pending", 6.0)]);

        engine.evaluate("#main", &m, "", &port, Timestamp(0));
        let before = engine.snapshot(Timestamp(10));
        let report = engine.reconcile(&m, &port, Timestamp(10));
        assert!(report.transitions.is_empty());
        let rt = runtime_of(&report.playbooks, "queue_backlog_recovery");
        assert_eq!(rt.state, PlaybookState::AwaitingDecision);
        assert_eq!(rt.last_action_status, "pending");
        assert_eq!(rt.audit, runtime_of(&before, "queue_backlog_recovery").audit);
    }

    #[test]
    fn test_trigger_errors() {
        let queue = ActionQueue::new(50);
        let port = QueuePort(&queue);
        let engine = PlaybookEngine::default();
        let m = Metrics::new();

        let err = engine.trigger(" ", "#main", &m, "", false, &port, Timestamp(0)).unwrap_err();
        assert!(matches!(err, ControlError::InvalidArgument(_)));
        let err = engine.trigger("nope", "#main", &m, "", false, &port, Timestamp(0)).unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));

        let view = engine
            .trigger(
                "ignored_rate_guard",
                "#main",
                &m,
                "operator asked",
                false,
                &port,
                Timestamp(0),
            )
            .unwrap();
        assert_eq!(view.runtime.state, PlaybookState::AwaitingDecision);

        let err = engine
            .trigger("ignored_rate_guard", "#main", &m, "", true, &port, Timestamp(1))
            .unwrap_err();
        assert_eq!(err.to_string(), "Conflict: playbook_busy");

        queue
            .decide_action(&view.runtime.waiting_action_id, "reject", "", "op", Timestamp(2))
            .unwrap();
        let err = engine
            .trigger("ignored_rate_guard", "#main", &m, "", false, &port, Timestamp(3))
            .unwrap_err();
        assert_eq!(err.to_string(), "Conflict: playbook_cooldown");

        let forced = engine
            .trigger("ignored_rate_guard", "#main", &m, "", true, &port, Timestamp(4))
            .unwrap();
        assert_eq!(forced.runtime.state, PlaybookState::AwaitingDecision);
        assert_ne!(forced.runtime.last_run_id, view.runtime.last_run_id);
    }

    #[test]
    fn test_audit_is_capped() {
        let queue = ActionQueue::new(500);
        let port = QueuePort(&queue);
        let engine = PlaybookEngine::default();
        let m = Metrics::new();

        for i in 0..20 {
            let t = i * 10;
            let view = engine
                .trigger("queue_backlog_recovery", "#main", &m, "", true, &port, Timestamp(t))
                .unwrap();
            queue
                .decide_action(
                    &view.runtime.waiting_action_id,
                    "reject",
                    "",
                    "op",
                    Timestamp(t + 1),
                )
                .unwrap();
            engine.reconcile(&m, &port, Timestamp(t + 2));
        }
        let views = engine.snapshot(Timestamp(2_000));
        let rt = runtime_of(&views, "queue_backlog_recovery");
        assert_eq!(rt.audit.len(), AUDIT_CAP);
        assert_eq!(rt.audit.last().unwrap().event, "cooldown_finished");
    }
}
