//! Goal & budget runtime.
//!
//! Owns the autonomy config, the per-goal due schedule, the auto-chat usage
//! window, suspend state and loop telemetry, all behind one lock.

pub mod budget;
pub mod patch;

use crate::runtime::budget::{BudgetDecision, BudgetReason, BudgetUsage, UsageWindow};
use serde::{Deserialize, Serialize};
use stagehand_core::config::AutonomyConfig;
use stagehand_core::types::{clip_text, Goal, RiskLevel, Timestamp};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

const REASON_MAX_CHARS: usize = 200;
const ERROR_MAX_CHARS: usize = 300;

/// Counters and labels written by the scheduler loop.
#[derive(Debug, Clone, Default)]
struct Telemetry {
    loop_running: bool,
    ticks_total: u64,
    last_tick: Option<Timestamp>,
    last_heartbeat: Option<Timestamp>,
    goal_runs_total: u64,
    last_goal_id: String,
    last_goal_run: Option<Timestamp>,
    budget_blocks_total: u64,
    last_budget_block: Option<(BudgetReason, Timestamp)>,
    dispatch_failures_total: u64,
    last_dispatch_error: String,
    last_dispatch_failure: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct SuspendState {
    reason: String,
    changed_at: Option<Timestamp>,
}

struct RuntimeState {
    config: AutonomyConfig,
    next_due: HashMap<String, i64>,
    usage: UsageWindow,
    suspend: SuspendState,
    telemetry: Telemetry,
}

/// Schedule view of one goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSchedule {
    pub id: String,
    pub name: String,
    pub risk: RiskLevel,
    pub enabled: bool,
    pub interval_seconds: u64,
    pub next_due_at: Option<String>,
    pub next_due_epoch: Option<i64>,
}

/// Snapshot of the runtime, before queue and playbook state are merged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeBaseSnapshot {
    pub generated_at: String,
    pub autonomy_enabled: bool,
    pub suspended: bool,
    pub suspend_reason: String,
    pub suspend_changed_at: Option<String>,
    pub loop_running: bool,
    pub heartbeat_interval_seconds: u64,
    pub last_heartbeat_at: Option<String>,
    /// No heartbeat within twice the configured interval.
    pub heartbeat_stale: bool,
    pub ticks_total: u64,
    pub last_tick_at: Option<String>,
    pub goal_runs_total: u64,
    pub last_goal_id: String,
    pub last_goal_run_at: Option<String>,
    pub budget_blocks_total: u64,
    pub last_budget_block_reason: Option<BudgetReason>,
    pub last_budget_block_at: Option<String>,
    pub dispatch_failures_total: u64,
    pub last_dispatch_error: String,
    pub last_dispatch_failure_at: Option<String>,
    pub budget: BudgetUsage,
    pub goals: Vec<GoalSchedule>,
}

/// Suspend/resume outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendStatus {
    pub suspended: bool,
    pub reason: String,
    pub changed_at: String,
}

/// Thread-safe goal scheduler and auto-chat budget.
pub struct AutonomyRuntime {
    state: Mutex<RuntimeState>,
}

impl AutonomyRuntime {
    /// Create a runtime from `config`, clamping it into supported ranges.
    pub fn new(config: AutonomyConfig) -> Self {
        Self {
            state: Mutex::new(RuntimeState {
                config: config.sanitized(),
                next_due: HashMap::new(),
                usage: UsageWindow::new(),
                suspend: SuspendState::default(),
                telemetry: Telemetry::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_config(&self) -> AutonomyConfig {
        self.lock().config.clone()
    }

    /// Merge a JSON patch into the config. Never fails; see [`patch`].
    pub fn update_config(&self, patch: &serde_json::Value) -> AutonomyConfig {
        let mut state = self.lock();
        let outcome = patch::apply_patch(&state.config, patch);
        if outcome.goals_replaced {
            state
                .next_due
                .retain(|id, _| outcome.config.goals.iter().any(|g| &g.id == id));
        }
        tracing::debug!(
            applied = ?outcome.applied,
            ignored = ?outcome.ignored,
            "Autonomy config updated"
        );
        state.config = outcome.config;
        state.config.clone()
    }

    pub fn suspend_agent(&self, reason: &str, now: Timestamp) -> SuspendStatus {
        self.set_suspended(true, reason, now)
    }

    pub fn resume_agent(&self, reason: &str, now: Timestamp) -> SuspendStatus {
        self.set_suspended(false, reason, now)
    }

    fn set_suspended(&self, suspended: bool, reason: &str, now: Timestamp) -> SuspendStatus {
        let mut state = self.lock();
        state.config.suspended = suspended;
        state.suspend.reason = clip_text(reason, REASON_MAX_CHARS);
        state.suspend.changed_at = Some(now);
        tracing::debug!(suspended, reason = %state.suspend.reason, "Agent suspend state changed");
        SuspendStatus {
            suspended,
            reason: state.suspend.reason.clone(),
            changed_at: now.to_iso(),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.lock().config.suspended
    }

    /// Decide whether an automatic chat message may be sent at `now`.
    pub fn can_send_auto_chat(&self, now: Timestamp) -> BudgetDecision {
        let mut state = self.lock();
        let RuntimeState { config, usage, .. } = &mut *state;
        usage.evaluate(config, now)
    }

    /// Record an automatic chat send. This is the only way usage grows.
    pub fn register_auto_chat_sent(&self, now: Timestamp) -> BudgetUsage {
        let mut state = self.lock();
        let RuntimeState { config, usage, .. } = &mut *state;
        usage.record(now);
        usage.usage(config, now)
    }

    /// Current usage without evaluating the gates.
    pub fn budget_usage(&self, now: Timestamp) -> BudgetUsage {
        let mut state = self.lock();
        let RuntimeState { config, usage, .. } = &mut *state;
        usage.usage(config, now)
    }

    /// Return enabled goals that are due and reschedule them.
    ///
    /// A goal seen for the first time is scheduled one interval out rather
    /// than fired. `force` returns every enabled goal regardless of
    /// autonomy or suspend state.
    pub fn consume_due_goals(&self, force: bool, now: Timestamp) -> Vec<Goal> {
        let mut state = self.lock();
        if !force && (!state.config.enabled || state.config.suspended) {
            return Vec::new();
        }

        let RuntimeState { config, next_due, .. } = &mut *state;
        let mut due = Vec::new();
        for goal in config.goals.iter().filter(|g| g.enabled) {
            let interval = goal.interval_seconds as i64;
            let is_due = if force {
                true
            } else {
                let next = *next_due.entry(goal.id.clone()).or_insert(now.0 + interval);
                next <= now.0
            };
            if is_due {
                next_due.insert(goal.id.clone(), now.0 + interval);
                due.push(goal.clone());
            }
        }
        due
    }

    pub fn register_tick(&self, now: Timestamp) {
        let mut state = self.lock();
        state.telemetry.ticks_total += 1;
        state.telemetry.last_tick = Some(now);
    }

    pub fn register_goal_run(&self, goal_id: &str, now: Timestamp) {
        let mut state = self.lock();
        state.telemetry.goal_runs_total += 1;
        state.telemetry.last_goal_id = goal_id.to_string();
        state.telemetry.last_goal_run = Some(now);
    }

    pub fn register_budget_block(&self, reason: BudgetReason, now: Timestamp) {
        let mut state = self.lock();
        state.telemetry.budget_blocks_total += 1;
        state.telemetry.last_budget_block = Some((reason, now));
    }

    pub fn register_dispatch_failure(&self, error: &str, now: Timestamp) {
        let mut state = self.lock();
        state.telemetry.dispatch_failures_total += 1;
        state.telemetry.last_dispatch_error = clip_text(error, ERROR_MAX_CHARS);
        state.telemetry.last_dispatch_failure = Some(now);
    }

    pub fn touch_heartbeat(&self, now: Timestamp) {
        self.lock().telemetry.last_heartbeat = Some(now);
    }

    pub fn set_loop_running(&self, running: bool) {
        self.lock().telemetry.loop_running = running;
    }

    pub fn runtime_base_snapshot(&self, now: Timestamp) -> RuntimeBaseSnapshot {
        let mut state = self.lock();
        let RuntimeState {
            config,
            next_due,
            usage,
            suspend,
            telemetry,
        } = &mut *state;

        let iso = |ts: Option<Timestamp>| ts.map(|t| t.to_iso());
        let stale_after = config.heartbeat_interval_seconds as i64 * 2;
        let heartbeat_stale = telemetry
            .last_heartbeat
            .map_or(true, |hb| now.seconds_since(hb) > stale_after);

        let goals = config
            .goals
            .iter()
            .map(|g| {
                let next = next_due.get(&g.id).copied();
                GoalSchedule {
                    id: g.id.clone(),
                    name: g.name.clone(),
                    risk: g.risk,
                    enabled: g.enabled,
                    interval_seconds: g.interval_seconds,
                    next_due_at: next.map(|t| Timestamp(t).to_iso()),
                    next_due_epoch: next,
                }
            })
            .collect();

        RuntimeBaseSnapshot {
            generated_at: now.to_iso(),
            autonomy_enabled: config.enabled,
            suspended: config.suspended,
            suspend_reason: suspend.reason.clone(),
            suspend_changed_at: iso(suspend.changed_at),
            loop_running: telemetry.loop_running,
            heartbeat_interval_seconds: config.heartbeat_interval_seconds,
            last_heartbeat_at: iso(telemetry.last_heartbeat),
            heartbeat_stale,
            ticks_total: telemetry.ticks_total,
            last_tick_at: iso(telemetry.last_tick),
            goal_runs_total: telemetry.goal_runs_total,
            last_goal_id: telemetry.last_goal_id.clone(),
            last_goal_run_at: iso(telemetry.last_goal_run),
            budget_blocks_total: telemetry.budget_blocks_total,
            last_budget_block_reason: telemetry.last_budget_block.map(|(r, _)| r),
            last_budget_block_at: telemetry.last_budget_block.map(|(_, t)| t.to_iso()),
            dispatch_failures_total: telemetry.dispatch_failures_total,
            last_dispatch_error: telemetry.last_dispatch_error.clone(),
            last_dispatch_failure_at: iso(telemetry.last_dispatch_failure),
            budget: usage.usage(config, now),
            goals,
        }
    }
}

impl Default for AutonomyRuntime {
    fn default() -> Self {
        Self::new(AutonomyConfig::default())
    }
}
