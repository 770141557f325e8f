//! Permissive merge of a JSON patch into the autonomy config.
//!
//! Only keys present in the patch are considered. A value that is missing,
//! mistyped or outside its accepted range leaves the previous value in
//! place; one bad field never rejects the rest of the update.

use serde_json::Value;
use stagehand_core::config::{
    normalize_goals, AutonomyConfig, ACTION_TTL_RANGE, BUDGET_10M_RANGE, BUDGET_60M_RANGE,
    BUDGET_DAILY_RANGE, HEARTBEAT_INTERVAL_RANGE, MIN_COOLDOWN_RANGE,
};
use stagehand_core::types::{Goal, RiskLevel};
use std::ops::RangeInclusive;

const DEFAULT_GOAL_INTERVAL_SECS: u64 = 600;

/// Result of applying a patch.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub config: AutonomyConfig,
    /// Keys whose values were written.
    pub applied: Vec<&'static str>,
    /// Keys present in the patch that kept their previous value.
    pub ignored: Vec<&'static str>,
    pub goals_replaced: bool,
}

/// Merge `patch` over `current`. Non-object patches change nothing.
pub fn apply_patch(current: &AutonomyConfig, patch: &Value) -> PatchOutcome {
    let mut outcome = PatchOutcome {
        config: current.clone(),
        applied: Vec::new(),
        ignored: Vec::new(),
        goals_replaced: false,
    };
    let Some(fields) = patch.as_object() else {
        return outcome;
    };

    let cfg = &mut outcome.config;
    let mut note = |key: &'static str, written: bool| {
        if written {
            outcome.applied.push(key);
        } else {
            outcome.ignored.push(key);
        }
    };

    if let Some(v) = fields.get("enabled") {
        note("enabled", merge_bool(&mut cfg.enabled, v));
    }
    if let Some(v) = fields.get("suspended") {
        note("suspended", merge_bool(&mut cfg.suspended, v));
    }
    let numeric: [(&'static str, &mut u64, RangeInclusive<u64>); 6] = [
        (
            "heartbeat_interval_seconds",
            &mut cfg.heartbeat_interval_seconds,
            HEARTBEAT_INTERVAL_RANGE,
        ),
        ("min_cooldown_seconds", &mut cfg.min_cooldown_seconds, MIN_COOLDOWN_RANGE),
        ("max_auto_chat_per_10m", &mut cfg.max_auto_chat_per_10m, BUDGET_10M_RANGE),
        ("max_auto_chat_per_60m", &mut cfg.max_auto_chat_per_60m, BUDGET_60M_RANGE),
        ("max_auto_chat_daily", &mut cfg.max_auto_chat_daily, BUDGET_DAILY_RANGE),
        ("action_ttl_seconds", &mut cfg.action_ttl_seconds, ACTION_TTL_RANGE),
    ];
    for (key, slot, range) in numeric {
        if let Some(v) = fields.get(key) {
            note(key, merge_u64(slot, v, &range));
        }
    }
    if let Some(v) = fields.get("goals") {
        match parse_goals(v) {
            Some(goals) => {
                cfg.goals = goals;
                outcome.goals_replaced = true;
                note("goals", true);
            }
            None => note("goals", false),
        }
    }

    outcome
}

fn merge_u64(slot: &mut u64, value: &Value, range: &RangeInclusive<u64>) -> bool {
    match read_u64(value) {
        Some(n) if range.contains(&n) => {
            *slot = n;
            true
        }
        _ => false,
    }
}

fn merge_bool(slot: &mut bool, value: &Value) -> bool {
    match read_bool(value) {
        Some(b) => {
            *slot = b;
            true
        }
        None => false,
    }
}

/// Read a non-negative integer from a JSON number or numeric string.
///
/// Fractional values are truncated.
pub fn read_u64(value: &Value) -> Option<u64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if n.is_finite() && n >= 0.0 && n <= u64::MAX as f64 {
        Some(n.trunc() as u64)
    } else {
        None
    }
}

/// Read a boolean from a JSON bool, `0`/`1`, or a common word.
pub fn read_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn read_str<'a>(fields: &'a serde_json::Map<String, Value>, key: &str) -> &'a str {
    fields.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Parse a replacement goal list. Returns `None` unless `value` is an array.
///
/// Non-object entries and entries with neither a name nor a prompt are
/// skipped.
pub fn parse_goals(value: &Value) -> Option<Vec<Goal>> {
    let entries = value.as_array()?;
    let goals = entries
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|fields| {
            let name = read_str(fields, "name").trim().to_string();
            let prompt = read_str(fields, "prompt").trim().to_string();
            if name.is_empty() && prompt.is_empty() {
                return None;
            }
            Some(Goal {
                id: read_str(fields, "id").to_string(),
                name,
                prompt,
                risk: RiskLevel::parse_lenient(read_str(fields, "risk")),
                interval_seconds: fields
                    .get("interval_seconds")
                    .and_then(read_u64)
                    .unwrap_or(DEFAULT_GOAL_INTERVAL_SECS),
                enabled: fields.get("enabled").and_then(read_bool).unwrap_or(true),
            })
        })
        .collect();
    Some(normalize_goals(goals))
}
