//! Sliding-window auto-chat budget.
//!
//! Keeps a time-ordered history of automatic chat sends from the last 24
//! hours and derives 10-minute, 60-minute and daily usage from it.

use serde::{Deserialize, Serialize};
use stagehand_core::config::AutonomyConfig;
use stagehand_core::types::Timestamp;
use std::collections::VecDeque;
use std::fmt;

const TEN_MINUTES: i64 = 600;
const SIXTY_MINUTES: i64 = 3600;
const ONE_DAY: i64 = 86_400;
/// Hard cap on retained send timestamps.
pub const MAX_HISTORY: usize = 5000;

/// Why an automatic chat send was allowed or blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetReason {
    Ok,
    BudgetDailyDisabled,
    AgentSuspended,
    CooldownActive,
    #[serde(rename = "budget_10m_exceeded")]
    Budget10mExceeded,
    #[serde(rename = "budget_60m_exceeded")]
    Budget60mExceeded,
    BudgetDailyExceeded,
}

impl BudgetReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetReason::Ok => "ok",
            BudgetReason::BudgetDailyDisabled => "budget_daily_disabled",
            BudgetReason::AgentSuspended => "agent_suspended",
            BudgetReason::CooldownActive => "cooldown_active",
            BudgetReason::Budget10mExceeded => "budget_10m_exceeded",
            BudgetReason::Budget60mExceeded => "budget_60m_exceeded",
            BudgetReason::BudgetDailyExceeded => "budget_daily_exceeded",
        }
    }
}

impl fmt::Display for BudgetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage counters and caps at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetUsage {
    pub messages_10m: usize,
    pub messages_60m: usize,
    pub messages_daily: usize,
    pub max_10m: u64,
    pub max_60m: u64,
    pub max_daily: u64,
    pub min_cooldown_seconds: u64,
    pub cooldown_remaining_seconds: u64,
    pub last_sent_at: Option<String>,
}

/// Outcome of `can_send_auto_chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetDecision {
    pub allowed: bool,
    pub reason: BudgetReason,
    pub usage: BudgetUsage,
}

/// Time-ordered history of auto-chat send timestamps (epoch seconds).
#[derive(Debug, Default)]
pub struct UsageWindow {
    sends: VecDeque<i64>,
    last_sent: Option<i64>,
}

impl UsageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one send at `now`, keeping the history sorted.
    pub fn record(&mut self, now: Timestamp) {
        let pos = self.sends.partition_point(|&t| t <= now.0);
        self.sends.insert(pos, now.0);
        self.last_sent = Some(self.last_sent.map_or(now.0, |prev| prev.max(now.0)));
        while self.sends.len() > MAX_HISTORY {
            self.sends.pop_front();
        }
    }

    /// Drop entries older than the daily cutoff.
    pub fn prune(&mut self, now: Timestamp) {
        let cutoff = now.0 - ONE_DAY;
        while self.sends.front().is_some_and(|&t| t <= cutoff) {
            self.sends.pop_front();
        }
    }

    pub fn last_sent(&self) -> Option<i64> {
        self.last_sent
    }

    pub fn len(&self) -> usize {
        self.sends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sends.is_empty()
    }

    /// Prune, then count sends inside each window.
    pub fn usage(&mut self, config: &AutonomyConfig, now: Timestamp) -> BudgetUsage {
        self.prune(now);
        let within = |span: i64| self.sends.iter().filter(|&&t| t > now.0 - span).count();
        let cooldown_remaining_seconds = self
            .last_sent
            .map(|last| {
                let elapsed = now.0 - last;
                (config.min_cooldown_seconds as i64 - elapsed).max(0) as u64
            })
            .unwrap_or(0);

        BudgetUsage {
            messages_10m: within(TEN_MINUTES),
            messages_60m: within(SIXTY_MINUTES),
            messages_daily: within(ONE_DAY),
            max_10m: config.max_auto_chat_per_10m,
            max_60m: config.max_auto_chat_per_60m,
            max_daily: config.max_auto_chat_daily,
            min_cooldown_seconds: config.min_cooldown_seconds,
            cooldown_remaining_seconds,
            last_sent_at: self.last_sent.map(|t| Timestamp(t).to_iso()),
        }
    }

    /// Evaluate the budget gates in fixed precedence order.
    pub fn evaluate(&mut self, config: &AutonomyConfig, now: Timestamp) -> BudgetDecision {
        let usage = self.usage(config, now);
        let reason = if config.max_auto_chat_daily == 0 {
            BudgetReason::BudgetDailyDisabled
        } else if config.suspended {
            BudgetReason::AgentSuspended
        } else if usage.cooldown_remaining_seconds > 0 {
            BudgetReason::CooldownActive
        } else if usage.messages_10m as u64 >= config.max_auto_chat_per_10m {
            BudgetReason::Budget10mExceeded
        } else if usage.messages_60m as u64 >= config.max_auto_chat_per_60m {
            BudgetReason::Budget60mExceeded
        } else if usage.messages_daily as u64 >= config.max_auto_chat_daily {
            BudgetReason::BudgetDailyExceeded
        } else {
            BudgetReason::Ok
        };

        BudgetDecision {
            allowed: reason == BudgetReason::Ok,
            reason,
            usage,
        }
    }
}
