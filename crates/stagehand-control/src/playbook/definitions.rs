//! Static playbook definitions and step templating.

use serde::{Deserialize, Serialize};
use stagehand_core::types::RiskLevel;
use std::collections::BTreeMap;
use std::fmt;

/// Live numeric inputs keyed by metric name.
pub type Metrics = BTreeMap<String, f64>;

/// How a trigger metric is compared against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gte,
    Lte,
    Eq,
}

impl Comparison {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Gte => value >= threshold,
            Comparison::Lte => value <= threshold,
            Comparison::Eq => (value - threshold).abs() < f64::EPSILON,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Gte => ">=",
            Comparison::Lte => "<=",
            Comparison::Eq => "==",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Comparison::Gte => "gte",
            Comparison::Lte => "lte",
            Comparison::Eq => "eq",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub metric: String,
    pub comparison: Comparison,
    pub threshold: f64,
}

/// Minimum-sample guard: `metric` must be at least `min` before auto-start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guard {
    pub metric: String,
    pub min: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub title: String,
    /// Body template. `{channel_id}`, `{trigger_reason}` and `{<metric>}`
    /// placeholders are substituted when the step is queued.
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub trigger: Trigger,
    pub guard: Option<Guard>,
    pub cooldown_seconds: u64,
    pub risk: RiskLevel,
    pub steps: Vec<PlaybookStep>,
}

impl PlaybookDefinition {
    /// True when the trigger metric is present and satisfies its comparison.
    pub fn trigger_met(&self, metrics: &Metrics) -> bool {
        metrics
            .get(&self.trigger.metric)
            .is_some_and(|&v| self.trigger.comparison.holds(v, self.trigger.threshold))
    }

    /// True when there is no guard or the guard metric meets its floor.
    /// A missing guard metric counts as zero.
    pub fn guard_met(&self, metrics: &Metrics) -> bool {
        self.guard.as_ref().map_or(true, |g| {
            metrics.get(&g.metric).copied().unwrap_or(0.0) >= g.min
        })
    }

    pub fn should_auto_start(&self, metrics: &Metrics) -> bool {
        self.trigger_met(metrics) && self.guard_met(metrics)
    }

    /// Human-readable reason for an automatic start, e.g. `queue_pending 9 >= 6`.
    pub fn auto_reason(&self, metrics: &Metrics) -> String {
        let value = metrics.get(&self.trigger.metric).copied().unwrap_or(0.0);
        format!(
            "{} {} {} {}",
            self.trigger.metric,
            format_number(value),
            self.trigger.comparison.symbol(),
            format_number(self.trigger.threshold)
        )
    }
}

/// Render a number without a trailing `.0` when it is integral.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Substitute `{channel_id}`, `{trigger_reason}` and metric placeholders.
/// Unknown placeholders are left as written.
pub fn render_template(
    template: &str,
    channel_id: &str,
    trigger_reason: &str,
    metrics: &Metrics,
) -> String {
    let mut out = template
        .replace("{channel_id}", channel_id)
        .replace("{trigger_reason}", trigger_reason);
    for (name, value) in metrics {
        out = out.replace(&format!("{{{}}}", name), &format_number(*value));
    }
    out
}

fn step(title: &str, body: &str) -> PlaybookStep {
    PlaybookStep {
        title: title.to_string(),
        body: body.to_string(),
    }
}

/// The playbooks every engine starts with.
pub fn builtin_playbooks() -> Vec<PlaybookDefinition> {
    vec![
        PlaybookDefinition {
            id: "queue_backlog_recovery".to_string(),
            name: "Queue backlog recovery".to_string(),
            description: "Work the pending action queue back down when reviews fall behind."
                .to_string(),
            trigger: Trigger {
                metric: "queue_pending".to_string(),
                comparison: Comparison::Gte,
                threshold: 6.0,
            },
            guard: None,
            cooldown_seconds: 900,
            risk: RiskLevel::SuggestStreamer,
            steps: vec![
                step(
                    "Triage pending actions",
                    "{queue_pending} actions are waiting in {channel_id}. Review the oldest ones first and reject anything stale. ({trigger_reason})",
                ),
                step(
                    "Confirm backlog cleared",
                    "Check that the pending queue is back near {queue_target_pending} and pause low-value goals if it is not.",
                ),
            ],
        },
        PlaybookDefinition {
            id: "ignored_rate_guard".to_string(),
            name: "Ignored rate guard".to_string(),
            description: "React when too many queued actions time out without a decision."
                .to_string(),
            trigger: Trigger {
                metric: "queue_ignored_rate_60m".to_string(),
                comparison: Comparison::Gte,
                threshold: 35.0,
            },
            guard: Some(Guard {
                metric: "queue_decisions_total_60m".to_string(),
                min: 4.0,
            }),
            cooldown_seconds: 900,
            risk: RiskLevel::SuggestStreamer,
            steps: vec![
                step(
                    "Review ignored actions",
                    "{queue_ignored_rate_60m}% of the last {queue_decisions_total_60m} decisions in {channel_id} timed out. Decide whether the agent is proposing too much. ({trigger_reason})",
                ),
                step(
                    "Tune autonomy budget",
                    "Lower goal frequency or the auto-chat budget so reviewers can keep up.",
                ),
            ],
        },
    ]
}
