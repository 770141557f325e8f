//! Stagehand binary: composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Initialize tracing
//! 3. Build the control plane
//! 4. Run the autonomy scheduler until Ctrl-C (or once with `--once`)

mod cli;

use async_trait::async_trait;
use clap::Parser;
use stagehand_control::{ChatDispatcher, ControlPlane, DispatchError, Scheduler};
use stagehand_core::config::StagehandConfig;
use stagehand_core::types::Goal;
use std::sync::Arc;
use std::time::Duration;

/// Dispatcher that logs instead of talking to a chat service.
struct LogDispatcher;

#[async_trait]
impl ChatDispatcher for LogDispatcher {
    async fn send_auto_chat(&self, channel_id: &str, goal: &Goal) -> Result<(), DispatchError> {
        tracing::info!(
            channel_id,
            goal_id = %goal.id,
            prompt = %goal.prompt,
            "Auto-chat dispatched"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();

    let config_file = args.resolve_config_path();
    let mut config = StagehandConfig::load_or_default(&config_file);
    config.general.mode = args.resolve_mode(config.general.mode);
    let log_level = args.resolve_log_level(&config.general.log_level);
    let channel_id = args.resolve_channel(&config.general.channel_id);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    tracing::info!("Starting Stagehand v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %config_file.display(),
        mode = %config.general.mode,
        "Configuration loaded"
    );

    let plane = Arc::new(ControlPlane::from_config(&config));
    let capabilities = plane.capabilities();
    tracing::info!(
        auto_chat = capabilities.auto_chat,
        ops_playbooks = capabilities.ops_playbooks,
        autonomy_enabled = config.autonomy.enabled,
        "Control plane ready"
    );

    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&plane),
        Arc::new(LogDispatcher),
        channel_id,
        Duration::from_secs(config.scheduler.tick_interval_seconds),
    ));

    if args.once {
        let report = scheduler.tick(None).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let loop_handle = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    scheduler.shutdown();
    loop_handle.await?;

    let snapshot = plane.runtime_snapshot(None);
    tracing::info!(
        ticks = snapshot.runtime.ticks_total,
        goal_runs = snapshot.runtime.goal_runs_total,
        pending = snapshot.queue.pending,
        "Stagehand stopped"
    );
    Ok(())
}
