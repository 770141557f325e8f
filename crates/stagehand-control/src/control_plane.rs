//! Control plane facade.
//!
//! Owns one action queue, one autonomy runtime and one playbook engine and
//! exposes them as a single API. Every method takes an optional timestamp;
//! `None` means the wall clock.

use crate::capabilities::{build_capabilities, Capabilities};
use crate::error::ControlError;
use crate::playbook::definitions::Metrics;
use crate::playbook::{ActionPort, PlaybookEngine, PlaybookReport, PlaybookView};
use crate::queue::ActionQueue;
use crate::runtime::budget::{BudgetDecision, BudgetReason, BudgetUsage};
use crate::runtime::{AutonomyRuntime, RuntimeBaseSnapshot, SuspendStatus};
use crate::types::{
    Action, ActionList, ActionStatus, NewAction, QueueRuntimeSnapshot, QueueSummary, QueueWindow,
};
use serde::{Deserialize, Serialize};
use stagehand_core::config::{AutonomyConfig, StagehandConfig};
use stagehand_core::types::{DeploymentMode, Goal, Timestamp};

/// Pending-queue level the backlog playbook steers toward.
pub const QUEUE_TARGET_PENDING: f64 = 3.0;

/// Playbook inputs plus the playbooks as they stand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpsPlaybooksSnapshot {
    pub generated_at: String,
    pub metrics: Metrics,
    pub playbooks: Vec<PlaybookView>,
}

/// Aggregate of runtime, queue and playbook state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub mode: DeploymentMode,
    #[serde(flatten)]
    pub runtime: RuntimeBaseSnapshot,
    pub queue: QueueSummary,
    pub queue_window_60m: QueueWindow,
    pub ops_metrics: Metrics,
    pub ops_playbooks: Vec<PlaybookView>,
}

/// Queue access handed to the playbook engine, with the configured TTL.
struct QueueGateway<'a> {
    queue: &'a ActionQueue,
    ttl_seconds: u64,
}

impl ActionPort for QueueGateway<'_> {
    fn get_action(&self, action_id: &str, now: Timestamp) -> Option<Action> {
        self.queue.get_action(action_id, self.ttl_seconds, now)
    }

    fn enqueue_action(&self, req: NewAction, now: Timestamp) -> Action {
        self.queue.enqueue_action(req, now)
    }
}

fn resolve(now: Option<Timestamp>) -> Timestamp {
    now.unwrap_or_else(Timestamp::now)
}

/// Metric map the playbooks are evaluated against.
pub fn playbook_metrics(snapshot: &QueueRuntimeSnapshot) -> Metrics {
    let mut metrics = Metrics::new();
    metrics.insert("queue_pending".to_string(), snapshot.queue.pending as f64);
    metrics.insert(
        "queue_ignored_rate_60m".to_string(),
        snapshot.queue_window_60m.ignored_rate,
    );
    metrics.insert(
        "queue_decisions_total_60m".to_string(),
        snapshot.queue_window_60m.decisions_total as f64,
    );
    metrics.insert("queue_target_pending".to_string(), QUEUE_TARGET_PENDING);
    metrics
}

pub struct ControlPlane {
    mode: DeploymentMode,
    queue: ActionQueue,
    runtime: AutonomyRuntime,
    playbooks: PlaybookEngine,
}

impl ControlPlane {
    pub fn new(mode: DeploymentMode, queue_capacity: usize, autonomy: AutonomyConfig) -> Self {
        Self {
            mode,
            queue: ActionQueue::new(queue_capacity),
            runtime: AutonomyRuntime::new(autonomy),
            playbooks: PlaybookEngine::default(),
        }
    }

    pub fn from_config(config: &StagehandConfig) -> Self {
        Self::new(
            config.general.mode,
            config.queue.capacity,
            config.autonomy.clone(),
        )
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    fn ttl_seconds(&self) -> u64 {
        self.runtime.get_config().action_ttl_seconds
    }

    fn gateway(&self) -> QueueGateway<'_> {
        QueueGateway {
            queue: &self.queue,
            ttl_seconds: self.ttl_seconds(),
        }
    }

    // -- autonomy ------------------------------------------------------------

    pub fn get_config(&self) -> AutonomyConfig {
        self.runtime.get_config()
    }

    pub fn update_config(&self, patch: &serde_json::Value) -> AutonomyConfig {
        self.runtime.update_config(patch)
    }

    pub fn suspend_agent(&self, reason: &str, now: Option<Timestamp>) -> SuspendStatus {
        self.runtime.suspend_agent(reason, resolve(now))
    }

    pub fn resume_agent(&self, reason: &str, now: Option<Timestamp>) -> SuspendStatus {
        self.runtime.resume_agent(reason, resolve(now))
    }

    pub fn can_send_auto_chat(&self, now: Option<Timestamp>) -> BudgetDecision {
        self.runtime.can_send_auto_chat(resolve(now))
    }

    pub fn register_auto_chat_sent(&self, now: Option<Timestamp>) -> BudgetUsage {
        self.runtime.register_auto_chat_sent(resolve(now))
    }

    pub fn consume_due_goals(&self, force: bool, now: Option<Timestamp>) -> Vec<Goal> {
        self.runtime.consume_due_goals(force, resolve(now))
    }

    pub fn register_tick(&self, now: Option<Timestamp>) {
        self.runtime.register_tick(resolve(now));
    }

    pub fn register_goal_run(&self, goal_id: &str, now: Option<Timestamp>) {
        self.runtime.register_goal_run(goal_id, resolve(now));
    }

    pub fn register_budget_block(&self, reason: BudgetReason, now: Option<Timestamp>) {
        self.runtime.register_budget_block(reason, resolve(now));
    }

    pub fn register_dispatch_failure(&self, error: &str, now: Option<Timestamp>) {
        self.runtime.register_dispatch_failure(error, resolve(now));
    }

    pub fn touch_heartbeat(&self, now: Option<Timestamp>) {
        self.runtime.touch_heartbeat(resolve(now));
    }

    pub fn set_loop_running(&self, running: bool) {
        self.runtime.set_loop_running(running);
    }

    // -- queue ---------------------------------------------------------------

    pub fn enqueue_action(&self, req: NewAction, now: Option<Timestamp>) -> Action {
        self.queue.enqueue_action(req, resolve(now))
    }

    pub fn decide_action(
        &self,
        action_id: &str,
        decision: &str,
        note: &str,
        decided_by: &str,
        now: Option<Timestamp>,
    ) -> Result<Action, ControlError> {
        self.queue
            .decide_action(action_id, decision, note, decided_by, resolve(now))
    }

    /// List actions. An unrecognised `status` label lists everything.
    pub fn list_actions(
        &self,
        status: Option<&str>,
        limit: usize,
        now: Option<Timestamp>,
    ) -> ActionList {
        self.queue.list_actions(
            ActionStatus::parse_filter(status),
            limit,
            self.ttl_seconds(),
            resolve(now),
        )
    }

    pub fn get_action(&self, action_id: &str, now: Option<Timestamp>) -> Option<Action> {
        self.queue.get_action(action_id, self.ttl_seconds(), resolve(now))
    }

    // -- playbooks -----------------------------------------------------------

    fn current_metrics(&self, now: Timestamp) -> Metrics {
        playbook_metrics(&self.queue.runtime_snapshot(self.ttl_seconds(), now))
    }

    /// Reconcile running playbooks and auto-start any whose trigger holds.
    pub fn run_ops_playbooks(
        &self,
        channel_id: &str,
        trigger_reason: &str,
        now: Option<Timestamp>,
    ) -> PlaybookReport {
        let now = resolve(now);
        let metrics = self.current_metrics(now);
        self.playbooks
            .evaluate(channel_id, &metrics, trigger_reason, &self.gateway(), now)
    }

    /// Reconcile running playbooks without starting new ones.
    pub fn reconcile_ops_playbooks(&self, now: Option<Timestamp>) -> PlaybookReport {
        let now = resolve(now);
        let metrics = self.current_metrics(now);
        self.playbooks.reconcile(&metrics, &self.gateway(), now)
    }

    pub fn trigger_ops_playbook(
        &self,
        playbook_id: &str,
        channel_id: &str,
        trigger_reason: &str,
        force: bool,
        now: Option<Timestamp>,
    ) -> Result<PlaybookView, ControlError> {
        let now = resolve(now);
        let metrics = self.current_metrics(now);
        self.playbooks.trigger(
            playbook_id,
            channel_id,
            &metrics,
            trigger_reason,
            force,
            &self.gateway(),
            now,
        )
    }

    pub fn ops_playbooks_snapshot(&self, now: Option<Timestamp>) -> OpsPlaybooksSnapshot {
        let now = resolve(now);
        let metrics = self.current_metrics(now);
        OpsPlaybooksSnapshot {
            generated_at: now.to_iso(),
            metrics,
            playbooks: self.playbooks.snapshot(now),
        }
    }

    // -- aggregate -----------------------------------------------------------

    pub fn runtime_snapshot(&self, now: Option<Timestamp>) -> RuntimeSnapshot {
        let now = resolve(now);
        let queue = self.queue.runtime_snapshot(self.ttl_seconds(), now);
        RuntimeSnapshot {
            mode: self.mode,
            runtime: self.runtime.runtime_base_snapshot(now),
            queue: queue.queue,
            queue_window_60m: queue.queue_window_60m,
            ops_metrics: playbook_metrics(&queue),
            ops_playbooks: self.playbooks.snapshot(now),
        }
    }

    pub fn build_capabilities(mode: DeploymentMode) -> Capabilities {
        build_capabilities(mode)
    }

    /// Capabilities of this instance's own mode.
    pub fn capabilities(&self) -> Capabilities {
        build_capabilities(self.mode)
    }
}

impl Default for ControlPlane {
    fn default() -> Self {
        Self::from_config(&StagehandConfig::default())
    }
}
