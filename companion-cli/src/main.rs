//! Auth companion CLI
//!
//! Command-line interface for operating a running companion daemon.
//!
//! # Usage
//!
//! ```bash
//! # Ensure a gateway token for an OIDC subject
//! companion ensure-token 2718281828 open-webui
//!
//! # Send a test notification through a webhook route
//! companion notify default --title "Test" --content "hello"
//!
//! # Show the effective daemon configuration (secrets redacted)
//! companion check-config
//! ```

mod client;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use companion_core::NotificationPayload;
use companion_daemon::{load_config, load_config_from};
use serde_json::Value;
use tracing_subscriber::FmtSubscriber;

use client::{DEFAULT_URL, DaemonClient};

#[derive(Parser)]
#[command(name = "companion")]
#[command(about = "Operate the Feishu / ZITADEL / new-api auth companion")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Base URL of the daemon
    #[arg(long, global = true, env = "COMPANION_URL", default_value = DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure a gateway token exists and print it
    EnsureToken {
        /// OIDC subject of the gateway user
        subject: String,

        /// Token name
        name: String,

        /// Group for a newly created token
        #[arg(short, long, default_value = "default")]
        group: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Post a notification through a webhook route
    Notify {
        /// Route source tag
        source: String,

        #[arg(long)]
        title: String,

        #[arg(long)]
        content: String,

        /// Value substituted for the placeholder (repeatable)
        #[arg(long = "value")]
        values: Vec<String>,

        /// Notification type
        #[arg(long = "type", default_value = "test")]
        kind: String,
    },

    /// Check that the daemon is reachable
    Health,

    /// Load and validate the daemon configuration
    CheckConfig {
        /// Configuration file (defaults to the daemon's lookup order)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        FmtSubscriber::builder()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    match cli.command {
        Commands::EnsureToken {
            subject,
            name,
            group,
            format,
        } => ensure_token(&cli.url, &subject, &name, &group, &format).await,
        Commands::Notify {
            source,
            title,
            content,
            values,
            kind,
        } => notify(&cli.url, &source, notification(kind, title, content, values)).await,
        Commands::Health => health(&cli.url).await,
        Commands::CheckConfig { path } => check_config(path),
    }
}

async fn ensure_token(url: &str, subject: &str, name: &str, group: &str, format: &str) -> Result<()> {
    let client = DaemonClient::new(url)?;
    let token = client.ensure_token(subject, name, group).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&token)?),
        _ => {
            println!("Token ID: {}", token.token_id);
            println!("{}", token.token);
        }
    }
    Ok(())
}

fn notification(
    kind: String,
    title: String,
    content: String,
    values: Vec<String>,
) -> NotificationPayload {
    NotificationPayload {
        kind,
        title,
        content,
        values: (!values.is_empty()).then(|| values.into_iter().map(Value::String).collect()),
        timestamp: chrono::Utc::now().timestamp(),
    }
}

async fn notify(url: &str, source: &str, payload: NotificationPayload) -> Result<()> {
    DaemonClient::new(url)?.notify(source, &payload).await?;
    println!("Notification delivered via route {:?}", source);
    Ok(())
}

async fn health(url: &str) -> Result<()> {
    DaemonClient::new(url)?.health().await?;
    println!("Daemon at {} is healthy", url);
    Ok(())
}

fn check_config(path: Option<PathBuf>) -> Result<()> {
    let config = match path {
        Some(path) => load_config_from(&path)?,
        None => load_config()?,
    };

    match &config.config_path {
        Some(path) => println!("Configuration loaded from {:?}", path),
        None => println!("No configuration file found, showing defaults"),
    }
    println!("Listen address: {}", config.socket_addr()?);
    println!("Webhook routes: {}", config.newapi.webhooks.len());
    println!("{:#?}", config);
    Ok(())
}
