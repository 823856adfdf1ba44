// =============================================================================
// Reward Autopilot — Main Entry Point
// =============================================================================
//
// Loads the account list, builds one HTTP session per account and runs the
// enabled components on fixed intervals until Ctrl+C. Accounts are started
// with a stagger so their requests do not land at the same instant.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod action_loop;
mod app_state;
mod autotrade;
mod birds;
mod error;
mod gateway;
mod journal;
mod monitor;
mod pacing;
mod position;
mod quests;
mod runtime_config;
mod scheduler;
mod session;
mod tapping;
mod types;
mod vooi;

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::runtime_config::RuntimeConfig;
use crate::scheduler::{build_account, spawn_account, Schedule};

const DEFAULT_CONFIG_PATH: &str = "autopilot_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Reward Autopilot — Starting Up                    ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path =
        std::env::var("AUTOPILOT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());

    let config = match RuntimeConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, path = %config_path, "Failed to load config, using defaults");
            let config = RuntimeConfig::default();
            if let Err(e) = config.save(&config_path) {
                error!(error = %e, "Failed to write config template");
            } else {
                info!(path = %config_path, "Config template written, add accounts and restart");
            }
            config
        }
    };
    config.validate()?;

    if config.accounts.is_empty() {
        warn!("No accounts configured — nothing to do");
        return Ok(());
    }

    info!(
        accounts = config.accounts.len(),
        auto_break_egg = config.auto_break_egg,
        auto_trade_positions = config.auto_trade_positions,
        auto_autotrade = config.auto_autotrade,
        auto_play_tapping = config.auto_play_tapping,
        auto_complete_quests = config.auto_complete_quests,
        profit_pct = config.thresholds.profit_pct,
        loss_pct = config.thresholds.loss_pct,
        "Configuration loaded"
    );

    // ── 2. Build sessions & spawn account tasks ──────────────────────────
    let schedule = Schedule::from_config(&config);
    let shutdown = CancellationToken::new();
    let mut runtimes = Vec::with_capacity(config.accounts.len());
    let mut handles = Vec::new();

    for (i, account) in config.accounts.iter().enumerate() {
        let runtime = match build_account(&config, account) {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(account = %account.name, error = %e, "Failed to build account session, skipping");
                continue;
            }
        };
        let delay = Duration::from_secs(config.account_delay_secs * i as u64);
        handles.extend(spawn_account(&runtime, schedule, delay, &shutdown));
        runtimes.push(runtime);
    }

    info!(tasks = handles.len(), "All accounts running. Press Ctrl+C to stop.");

    // ── 3. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");
    shutdown.cancel();

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "account task ended abnormally");
        }
    }

    for runtime in &runtimes {
        match serde_json::to_string(&runtime.state.summary()) {
            Ok(summary) => info!(account = %runtime.state.name, %summary, "account summary"),
            Err(e) => warn!(error = %e, "failed to serialize account summary"),
        }
    }

    info!("Reward Autopilot shut down complete.");
    Ok(())
}
