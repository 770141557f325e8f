//! Static feature flags per deployment mode.

use serde::{Deserialize, Serialize};
use stagehand_core::types::DeploymentMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub mode: DeploymentMode,
    pub auto_chat: bool,
    pub action_decisions: bool,
    pub ops_playbooks: bool,
    pub config_updates: bool,
    pub suspend_resume: bool,
    pub local_file_config: bool,
}

/// Capability descriptor for `mode`.
pub fn build_capabilities(mode: DeploymentMode) -> Capabilities {
    match mode {
        DeploymentMode::Local => Capabilities {
            mode,
            auto_chat: true,
            action_decisions: true,
            ops_playbooks: true,
            config_updates: true,
            suspend_resume: true,
            local_file_config: true,
        },
        DeploymentMode::Hosted => Capabilities {
            mode,
            auto_chat: true,
            action_decisions: true,
            ops_playbooks: true,
            config_updates: true,
            suspend_resume: true,
            local_file_config: false,
        },
        // Observing only. Suspend stays available as a kill switch.
        DeploymentMode::ReadOnly => Capabilities {
            mode,
            auto_chat: false,
            action_decisions: false,
            ops_playbooks: false,
            config_updates: false,
            suspend_resume: true,
            local_file_config: false,
        },
    }
}
