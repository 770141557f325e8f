//! Shared domain primitives for the Stagehand control plane.
//!
//! Timestamps, risk classification, deployment modes, and the goal
//! definition used by both the configuration file and the runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Timestamp
// =============================================================================

/// Unix epoch seconds (UTC).
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// ISO-8601 UTC rendering with second precision, e.g. `2024-01-01T00:00:00Z`.
    pub fn to_iso(&self) -> String {
        self.to_datetime().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Seconds elapsed from `earlier` to `self` (negative if `earlier` is later).
    pub fn seconds_since(&self, earlier: Timestamp) -> i64 {
        self.0 - earlier.0
    }

    pub fn plus_seconds(&self, seconds: u64) -> Timestamp {
        Timestamp(self.0.saturating_add(seconds.min(i64::MAX as u64) as i64))
    }
}

// =============================================================================
// Enums
// =============================================================================

/// How an agent-proposed action is routed.
///
/// Only `AutoChat` may be dispatched without a human decision, and only
/// while the auto-chat budget allows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum RiskLevel {
    AutoChat,
    #[default]
    SuggestStreamer,
    ModerationAction,
    ClipCandidate,
}

impl RiskLevel {
    /// Parse a risk label, mapping anything unrecognised to `SuggestStreamer`.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::AutoChat => "auto_chat",
            RiskLevel::SuggestStreamer => "suggest_streamer",
            RiskLevel::ModerationAction => "moderation_action",
            RiskLevel::ClipCandidate => "clip_candidate",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto_chat" => Ok(RiskLevel::AutoChat),
            "suggest_streamer" => Ok(RiskLevel::SuggestStreamer),
            "moderation_action" => Ok(RiskLevel::ModerationAction),
            "clip_candidate" => Ok(RiskLevel::ClipCandidate),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

impl From<String> for RiskLevel {
    fn from(raw: String) -> Self {
        RiskLevel::parse_lenient(&raw)
    }
}

/// Deployment mode used to select the capability descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum DeploymentMode {
    #[default]
    Local,
    Hosted,
    ReadOnly,
}

impl DeploymentMode {
    /// Parse a mode label, mapping anything unrecognised to `Local`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hosted" | "cloud" => DeploymentMode::Hosted,
            "read_only" | "readonly" => DeploymentMode::ReadOnly,
            _ => DeploymentMode::Local,
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMode::Local => write!(f, "local"),
            DeploymentMode::Hosted => write!(f, "hosted"),
            DeploymentMode::ReadOnly => write!(f, "read_only"),
        }
    }
}

impl From<String> for DeploymentMode {
    fn from(raw: String) -> Self {
        DeploymentMode::parse_lenient(&raw)
    }
}

// =============================================================================
// Goal
// =============================================================================

/// Shortest allowed goal interval in seconds.
pub const GOAL_INTERVAL_MIN_SECS: u64 = 60;
/// Longest allowed goal interval in seconds.
pub const GOAL_INTERVAL_MAX_SECS: u64 = 86_400;

/// A recurring autonomous objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub risk: RiskLevel,
    pub interval_seconds: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Goal {
    fn builtin(
        id: &str,
        name: &str,
        prompt: &str,
        risk: RiskLevel,
        interval: u64,
        enabled: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            prompt: prompt.to_string(),
            risk,
            interval_seconds: interval,
            enabled,
        }
    }

    /// The goals shipped with a fresh install.
    pub fn builtin_defaults() -> Vec<Goal> {
        vec![
            Goal::builtin(
                "chat_pulse",
                "Chat pulse",
                "Post a short, friendly message that keeps chat engaged with the current stream topic.",
                RiskLevel::AutoChat,
                900,
                true,
            ),
            Goal::builtin(
                "streamer_hint",
                "Streamer hint",
                "Suggest one concrete thing the streamer could respond to in recent chat.",
                RiskLevel::SuggestStreamer,
                600,
                true,
            ),
            Goal::builtin(
                "safety_watch",
                "Safety watch",
                "Review recent chat for harassment or spam and propose a moderation action if needed.",
                RiskLevel::ModerationAction,
                300,
                true,
            ),
            Goal::builtin(
                "detect_clip",
                "Detect clip",
                "Identify a highlight moment from the last few minutes that is worth clipping.",
                RiskLevel::ClipCandidate,
                600,
                false,
            ),
        ]
    }

    /// Clamp the interval into the supported range.
    pub fn clamped(mut self) -> Self {
        self.interval_seconds = self
            .interval_seconds
            .clamp(GOAL_INTERVAL_MIN_SECS, GOAL_INTERVAL_MAX_SECS);
        self
    }
}

// =============================================================================
// Text helpers
// =============================================================================

/// Trim `text` and cut it to at most `max_chars` characters.
pub fn clip_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Lowercase ASCII slug with `_` separators, at most 48 characters.
///
/// Returns an empty string when `raw` has no alphanumeric characters.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
        if slug.len() >= 48 {
            break;
        }
    }
    slug
}
