//! Auth companion daemon
//!
//! Receives Feishu contact events and reconciles them into ZITADEL, issues
//! gateway tokens for Open WebUI, and relays gateway notifications to Feishu.
//!
//! # Running
//!
//! ```bash
//! cargo run -p companion-daemon
//! # or after install:
//! companiond
//! ```

use anyhow::{Context, Result};
use companion_daemon::{ApiState, CompanionConfig, load_config, start_server};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_logging(&config.log_level);

    info!("Starting auth companion daemon...");
    match &config.config_path {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("No configuration file found, using defaults"),
    }

    run_daemon(config).await
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn run_daemon(config: CompanionConfig) -> Result<()> {
    let addr = config.socket_addr()?;

    let state = ApiState::from_config(&config)
        .await
        .context("Failed to initialise adapters")?;

    let server_handle = start_server(addr, state).await?;

    info!(addr = %server_handle.local_addr(), "Daemon running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, stopping server...");

    server_handle.stop().await?;

    info!("Daemon stopped");
    Ok(())
}
