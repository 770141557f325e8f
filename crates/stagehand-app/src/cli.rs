//! CLI argument definitions for the `stagehand` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use stagehand_core::types::DeploymentMode;
use std::path::PathBuf;

/// Stagehand: the control plane of an autonomous stream chat agent.
#[derive(Parser, Debug)]
#[command(name = "stagehand", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Channel the scheduler runs goals and playbooks for.
    #[arg(long = "channel")]
    pub channel: Option<String>,

    /// Deployment mode (local, hosted, read_only).
    #[arg(short = 'm', long = "mode")]
    pub mode: Option<String>,

    /// Run a single scheduler tick, print the report, and exit.
    #[arg(long = "once")]
    pub once: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > STAGEHAND_CONFIG env var > ~/.stagehand/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("STAGEHAND_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }

    pub fn resolve_channel(&self, config_channel: &str) -> String {
        match self.channel.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => config_channel.to_string(),
        }
    }

    pub fn resolve_mode(&self, config_mode: DeploymentMode) -> DeploymentMode {
        self.mode
            .as_deref()
            .map(DeploymentMode::parse_lenient)
            .unwrap_or(config_mode)
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".stagehand").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".stagehand").join("config.toml");
    }
    PathBuf::from("config.toml")
}
