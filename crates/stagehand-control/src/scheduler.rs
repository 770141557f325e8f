//! Autonomy scheduler loop.
//!
//! Each tick consumes due goals, dispatches `auto_chat` goals that the
//! budget allows, queues everything else for review, and then runs the
//! ops playbooks.

use crate::control_plane::ControlPlane;
use crate::error::DispatchError;
use crate::runtime::budget::BudgetReason;
use crate::types::{NewAction, Payload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use stagehand_core::types::{Goal, RiskLevel, Timestamp};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Delivers automatic chat messages for a goal.
#[async_trait]
pub trait ChatDispatcher: Send + Sync {
    async fn send_auto_chat(&self, channel_id: &str, goal: &Goal) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedGoal {
    pub goal_id: String,
    pub reason: BudgetReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedGoal {
    pub goal_id: String,
    pub error: String,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub at: String,
    pub goals_due: usize,
    pub dispatched: Vec<String>,
    pub blocked: Vec<BlockedGoal>,
    pub failed: Vec<FailedGoal>,
    /// Ids of actions queued for human review.
    pub enqueued: Vec<String>,
    pub playbook_transitions: usize,
}

pub struct Scheduler {
    plane: Arc<ControlPlane>,
    dispatcher: Arc<dyn ChatDispatcher>,
    channel_id: String,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Scheduler {
    pub fn new(
        plane: Arc<ControlPlane>,
        dispatcher: Arc<dyn ChatDispatcher>,
        channel_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            plane,
            dispatcher,
            channel_id: channel_id.into(),
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn plane(&self) -> &Arc<ControlPlane> {
        &self.plane
    }

    /// Run one scheduling pass at `now` (wall clock when `None`).
    pub async fn tick(&self, now: Option<Timestamp>) -> TickReport {
        let now = now.unwrap_or_else(Timestamp::now);
        let at = Some(now);
        self.plane.register_tick(at);
        self.plane.touch_heartbeat(at);

        let goals = self.plane.consume_due_goals(false, at);
        let mut report = TickReport {
            at: now.to_iso(),
            goals_due: goals.len(),
            ..TickReport::default()
        };

        for goal in &goals {
            self.plane.register_goal_run(&goal.id, at);
            if goal.risk != RiskLevel::AutoChat {
                let action = self.plane.enqueue_action(self.goal_action(goal), at);
                report.enqueued.push(action.id);
                continue;
            }

            let decision = self.plane.can_send_auto_chat(at);
            if !decision.allowed {
                tracing::info!(
                    goal_id = %goal.id,
                    reason = %decision.reason,
                    "Auto-chat blocked by budget"
                );
                self.plane.register_budget_block(decision.reason, at);
                report.blocked.push(BlockedGoal {
                    goal_id: goal.id.clone(),
                    reason: decision.reason,
                });
                continue;
            }

            match self.dispatcher.send_auto_chat(&self.channel_id, goal).await {
                Ok(()) => {
                    self.plane.register_auto_chat_sent(at);
                    report.dispatched.push(goal.id.clone());
                }
                Err(e) => {
                    tracing::warn!(goal_id = %goal.id, error = %e, "Auto-chat dispatch failed");
                    self.plane.register_dispatch_failure(&e.to_string(), at);
                    report.failed.push(FailedGoal {
                        goal_id: goal.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let playbooks = self.plane.run_ops_playbooks(&self.channel_id, "scheduler_tick", at);
        report.playbook_transitions = playbooks.transitions.len();

        tracing::debug!(
            goals_due = report.goals_due,
            dispatched = report.dispatched.len(),
            blocked = report.blocked.len(),
            enqueued = report.enqueued.len(),
            playbook_transitions = report.playbook_transitions,
            "Scheduler tick complete"
        );
        report
    }

    fn goal_action(&self, goal: &Goal) -> NewAction {
        let mut payload = Payload::new();
        payload.insert("goal_id".to_string(), json!(goal.id));
        payload.insert("channel_id".to_string(), json!(self.channel_id));
        NewAction::new("goal", goal.risk, &goal.name, &goal.prompt)
            .with_payload(payload)
            .created_by("scheduler")
    }

    /// Tick every interval until [`Scheduler::shutdown`] is called.
    pub async fn run(&self) {
        self.plane.set_loop_running(true);
        tracing::info!(
            channel_id = %self.channel_id,
            interval_secs = self.interval.as_secs(),
            "Scheduler started"
        );
        loop {
            self.tick(None).await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.notified() => break,
            }
        }
        self.plane.set_loop_running(false);
        tracing::info!("Scheduler stopped");
    }

    /// Signal the loop to stop after the current tick.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ChatDispatcher for RecordingDispatcher {
        async fn send_auto_chat(
            &self,
            _channel_id: &str,
            goal: &Goal,
        ) -> Result<(), DispatchError> {
            if self.fail {
                return Err(DispatchError::Failed("socket closed".to_string()));
            }
            self.sent.lock().unwrap().push(goal.id.clone());
            Ok(())
        }
    }

    fn plane_with_goals(goals: serde_json::Value) -> Arc<ControlPlane> {
        let plane = Arc::new(ControlPlane::default());
        plane.update_config(&json!({"enabled": true, "goals": goals}));
        plane
    }

    #[tokio::test]
    async fn test_tick_dispatches_and_enqueues() {
        let plane = plane_with_goals(json!([
            {"id": "hello", "name": "Hello", "prompt": "say hi", "risk": "auto_chat", "interval_seconds": 60},
            {"id": "hint", "name": "Hint", "prompt": "hint", "risk": "suggest_streamer", "interval_seconds": 60}
        ]));
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let scheduler = Scheduler::new(
            Arc::clone(&plane),
            dispatcher.clone(),
            "#main",
            Duration::from_secs(15),
        );

        let first = scheduler.tick(Some(Timestamp(1_000))).await;
        assert_eq!(first.goals_due, 0);

        let report = scheduler.tick(Some(Timestamp(1_061))).await;
        assert_eq!(report.goals_due, 2);
        assert_eq!(report.dispatched, vec!["hello".to_string()]);
        assert_eq!(report.enqueued.len(), 1);
        assert_eq!(*dispatcher.sent.lock().unwrap(), vec!["hello".to_string()]);

        let action = plane.get_action(&report.enqueued[0], Some(Timestamp(1_061))).unwrap();
        assert_eq!(action.kind, "goal");
        assert_eq!(action.created_by, "scheduler");
        assert_eq!(action.payload["goal_id"], json!("hint"));

        let snap = plane.runtime_snapshot(Some(Timestamp(1_062)));
        assert_eq!(snap.runtime.ticks_total, 2);
        assert_eq!(snap.runtime.goal_runs_total, 2);
        assert_eq!(snap.runtime.budget.messages_10m, 1);
    }

    #[tokio::test]
    async fn test_tick_records_budget_block() {
        let plane = plane_with_goals(json!([
            {"id": "hello", "name": "Hello", "prompt": "say hi", "risk": "auto_chat", "interval_seconds": 60}
        ]));
        plane.update_config(&json!({"max_auto_chat_daily": 0}));
        let scheduler = Scheduler::new(
            Arc::clone(&plane),
            Arc::new(RecordingDispatcher::default()),
            "#main",
            Duration::from_secs(15),
        );

        scheduler.tick(Some(Timestamp(0))).await;
        let report = scheduler.tick(Some(Timestamp(61))).await;
        assert_eq!(report.blocked.len(), 1);
        assert_eq!(report.blocked[0].reason, BudgetReason::BudgetDailyDisabled);
        assert_eq!(plane.runtime_snapshot(Some(Timestamp(62))).runtime.budget_blocks_total, 1);
    }

    #[tokio::test]
    async fn test_tick_records_dispatch_failure() {
        let plane = plane_with_goals(json!([
            {"id": "hello", "name": "Hello", "prompt": "say hi", "risk": "auto_chat", "interval_seconds": 60}
        ]));
        let dispatcher = Arc::new(RecordingDispatcher {
            fail: true,
            ..RecordingDispatcher::default()
        });
        let scheduler = Scheduler::new(
            Arc::clone(&plane),
            dispatcher,
            "#main",
            Duration::from_secs(15),
        );

        scheduler.tick(Some(Timestamp(0))).await;
        let report = scheduler.tick(Some(Timestamp(61))).await;
        assert_eq!(report.failed.len(), 1);
        assert!(report.dispatched.is_empty());

        let snap = plane.runtime_snapshot(Some(Timestamp(62)));
        assert_eq!(snap.runtime.dispatch_failures_total, 1);
        assert_eq!(snap.runtime.last_dispatch_error, "Dispatch failed: socket closed");
        assert_eq!(snap.runtime.budget.messages_daily, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let plane = Arc::new(ControlPlane::default());
        let scheduler = Scheduler::new(
            Arc::clone(&plane),
            Arc::new(RecordingDispatcher::default()),
            "#main",
            Duration::from_secs(3600),
        );

        scheduler.shutdown();
        tokio::time::timeout(Duration::from_secs(2), scheduler.run())
            .await
            .expect("scheduler should stop within timeout");

        let snap = plane.runtime_snapshot(None);
        assert!(!snap.runtime.loop_running);
        assert_eq!(snap.runtime.ticks_total, 1);
    }
}
