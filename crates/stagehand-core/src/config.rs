use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::types::{clip_text, slugify, DeploymentMode, Goal};

/// Accepted range for `heartbeat_interval_seconds`.
pub const HEARTBEAT_INTERVAL_RANGE: RangeInclusive<u64> = 15..=3600;
/// Accepted range for `min_cooldown_seconds`.
pub const MIN_COOLDOWN_RANGE: RangeInclusive<u64> = 0..=3600;
/// Accepted range for `max_auto_chat_per_10m`.
pub const BUDGET_10M_RANGE: RangeInclusive<u64> = 0..=200;
/// Accepted range for `max_auto_chat_per_60m`.
pub const BUDGET_60M_RANGE: RangeInclusive<u64> = 0..=1000;
/// Accepted range for `max_auto_chat_daily`.
pub const BUDGET_DAILY_RANGE: RangeInclusive<u64> = 0..=5000;
/// Accepted range for `action_ttl_seconds`.
pub const ACTION_TTL_RANGE: RangeInclusive<u64> = 60..=86_400;
/// Accepted range for `tick_interval_seconds`.
pub const TICK_INTERVAL_RANGE: RangeInclusive<u64> = 1..=3600;

const GOAL_NAME_MAX_CHARS: usize = 80;
const GOAL_PROMPT_MAX_CHARS: usize = 1000;

/// Top-level configuration for the Stagehand application.
///
/// Loaded from `~/.stagehand/config.toml` by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagehandConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub autonomy: AutonomyConfig,
}

impl StagehandConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed. Numeric fields
    /// are clamped into their supported ranges.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: StagehandConfig = toml::from_str(&content)?;
        config.autonomy = config.autonomy.sanitized();
        config.scheduler.tick_interval_seconds =
            clamp_range(config.scheduler.tick_interval_seconds, &TICK_INTERVAL_RANGE);
        config.queue.capacity = config.queue.capacity.max(1);
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Deployment mode: local, hosted, read_only.
    pub mode: DeploymentMode,
    /// Channel the scheduler evaluates playbooks for.
    pub channel_id: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mode: DeploymentMode::Local,
            channel_id: "default".to_string(),
        }
    }
}

/// Action queue sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of actions retained; the oldest is evicted beyond this.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 400 }
    }
}

/// Autonomy scheduler loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks.
    pub tick_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 15,
        }
    }
}

/// Runtime-tunable autonomy settings.
///
/// This is the record served by `get_config` and merged by `update_config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomyConfig {
    /// Whether recurring goals fire on their own.
    pub enabled: bool,
    pub heartbeat_interval_seconds: u64,
    /// Minimum gap between two automatic chat messages.
    pub min_cooldown_seconds: u64,
    pub max_auto_chat_per_10m: u64,
    pub max_auto_chat_per_60m: u64,
    /// A daily cap of zero disables automatic chat entirely.
    pub max_auto_chat_daily: u64,
    /// Pending actions older than this are auto-ignored.
    pub action_ttl_seconds: u64,
    pub suspended: bool,
    pub goals: Vec<Goal>,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            heartbeat_interval_seconds: 60,
            min_cooldown_seconds: 90,
            max_auto_chat_per_10m: 3,
            max_auto_chat_per_60m: 12,
            max_auto_chat_daily: 60,
            action_ttl_seconds: 900,
            suspended: false,
            goals: Goal::builtin_defaults(),
        }
    }
}

impl AutonomyConfig {
    /// Clamp every numeric field and normalize the goal list.
    pub fn sanitized(mut self) -> Self {
        self.heartbeat_interval_seconds =
            clamp_range(self.heartbeat_interval_seconds, &HEARTBEAT_INTERVAL_RANGE);
        self.min_cooldown_seconds = clamp_range(self.min_cooldown_seconds, &MIN_COOLDOWN_RANGE);
        self.max_auto_chat_per_10m = clamp_range(self.max_auto_chat_per_10m, &BUDGET_10M_RANGE);
        self.max_auto_chat_per_60m = clamp_range(self.max_auto_chat_per_60m, &BUDGET_60M_RANGE);
        self.max_auto_chat_daily = clamp_range(self.max_auto_chat_daily, &BUDGET_DAILY_RANGE);
        self.action_ttl_seconds = clamp_range(self.action_ttl_seconds, &ACTION_TTL_RANGE);
        self.goals = normalize_goals(self.goals);
        self
    }
}

fn clamp_range(value: u64, range: &RangeInclusive<u64>) -> u64 {
    value.clamp(*range.start(), *range.end())
}

/// Normalize a goal list: slug ids (falling back to the name, then `goal`),
/// numeric suffixes on collision, clamped intervals, clipped text.
pub fn normalize_goals(goals: Vec<Goal>) -> Vec<Goal> {
    let mut seen: HashSet<String> = HashSet::new();
    goals
        .into_iter()
        .map(|goal| {
            let mut base = slugify(&goal.id);
            if base.is_empty() {
                base = slugify(&goal.name);
            }
            if base.is_empty() {
                base = "goal".to_string();
            }
            let mut id = base.clone();
            let mut suffix = 2;
            while seen.contains(&id) {
                id = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            seen.insert(id.clone());

            let name = clip_text(&goal.name, GOAL_NAME_MAX_CHARS);
            Goal {
                name: if name.is_empty() { id.clone() } else { name },
                prompt: clip_text(&goal.prompt, GOAL_PROMPT_MAX_CHARS),
                id,
                ..goal
            }
            .clamped()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StagehandError;
    use crate::types::RiskLevel;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn goal(id: &str, name: &str, interval: u64) -> Goal {
        Goal {
            id: id.to_string(),
            name: name.to_string(),
            prompt: "p".to_string(),
            risk: RiskLevel::AutoChat,
            interval_seconds: interval,
            enabled: true,
        }
    }

    #[test]
    fn test_default_config() {
        let config = StagehandConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.mode, DeploymentMode::Local);
        assert_eq!(config.queue.capacity, 400);
        assert_eq!(config.scheduler.tick_interval_seconds, 15);
        assert!(!config.autonomy.enabled);
        assert_eq!(config.autonomy.action_ttl_seconds, 900);
        assert_eq!(config.autonomy.goals.len(), 4);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[general]
log_level = "debug"
mode = "hosted"
channel_id = "chan42"

[queue]
capacity = 50

[autonomy]
enabled = true
max_auto_chat_per_10m = 5

[[autonomy.goals]]
id = "Hype Train"
name = "Hype train"
prompt = "Cheer the hype train"
risk = "auto_chat"
interval_seconds = 120
"#;
        let file = create_temp_config(content);
        let config = StagehandConfig::load(file.path()).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.mode, DeploymentMode::Hosted);
        assert_eq!(config.general.channel_id, "chan42");
        assert_eq!(config.queue.capacity, 50);
        assert!(config.autonomy.enabled);
        assert_eq!(config.autonomy.max_auto_chat_per_10m, 5);
        // Untouched fields keep their defaults.
        assert_eq!(config.autonomy.max_auto_chat_per_60m, 12);
        assert_eq!(config.autonomy.goals.len(), 1);
        assert_eq!(config.autonomy.goals[0].id, "hype_train");
        assert!(config.autonomy.goals[0].enabled);
    }

    #[test]
    fn test_load_clamps_out_of_range_values() {
        let content = r#"
[scheduler]
tick_interval_seconds = 0

[autonomy]
action_ttl_seconds = 5
heartbeat_interval_seconds = 999999
"#;
        let file = create_temp_config(content);
        let config = StagehandConfig::load(file.path()).unwrap();
        assert_eq!(config.scheduler.tick_interval_seconds, 1);
        assert_eq!(config.autonomy.action_ttl_seconds, 60);
        assert_eq!(config.autonomy.heartbeat_interval_seconds, 3600);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = StagehandConfig::load_or_default(Path::new("/nonexistent/stagehand.toml"));
        assert_eq!(config.queue.capacity, 400);
    }

    #[test]
    fn test_load_invalid_toml() {
        let file = create_temp_config("this is [not valid");
        let err = StagehandConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, StagehandError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = StagehandConfig::default();
        config.autonomy.enabled = true;
        config.general.channel_id = "saved".to_string();
        config.save(&path).unwrap();

        let loaded = StagehandConfig::load(&path).unwrap();
        assert!(loaded.autonomy.enabled);
        assert_eq!(loaded.general.channel_id, "saved");
        assert_eq!(loaded.autonomy, config.autonomy);
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let file = create_temp_config("");
        let config = StagehandConfig::load(file.path()).unwrap();
        assert_eq!(config.autonomy, AutonomyConfig::default());
    }

    #[test]
    fn test_normalize_goals_dedupes_ids() {
        let goals = normalize_goals(vec![
            goal("pulse", "A", 120),
            goal("Pulse", "B", 120),
            goal("", "Pulse", 120),
            goal("", "", 120),
        ]);
        let ids: Vec<&str> = goals.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["pulse", "pulse_2", "pulse_3", "goal"]);
        assert_eq!(goals[3].name, "goal");
    }

    #[test]
    fn test_normalize_goals_clamps_interval() {
        let goals = normalize_goals(vec![goal("a", "a", 1), goal("b", "b", 999_999)]);
        assert_eq!(goals[0].interval_seconds, 60);
        assert_eq!(goals[1].interval_seconds, 86_400);
    }
}
