//! # relay
//!
//! WebSocket relay server binary: loads settings, installs logging and
//! metrics, then serves until Ctrl-C and drains connections on the way out.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_logging::{LogFormat, LogLevel};
use relay_server::deployment::SERVER_VERSION;
use relay_server::{DeploymentInfo, RelayServer, ServerConfig};
use relay_settings::RelaySettings;

/// Content-agnostic WebSocket message relay.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "WebSocket message relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.relay/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

/// Load the settings layers, apply CLI flags on top and validate.
fn resolve_settings(args: &Cli) -> Result<RelaySettings> {
    let path = args
        .settings
        .clone()
        .unwrap_or_else(relay_settings::settings_path);
    let mut settings = relay_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    if let Some(host) = &args.host {
        settings.server.host.clone_from(host);
    }
    if let Some(port) = args.port {
        settings.server.port = port;
    }

    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = resolve_settings(&args)?;

    relay_logging::init_subscriber(
        LogLevel::from_str_lossy(&settings.logging.level),
        LogFormat::from_str_lossy(&settings.logging.format),
    );

    let deployment = DeploymentInfo::from_env();
    tracing::info!(
        version = SERVER_VERSION,
        commit = %deployment.commit,
        actor = %deployment.actor,
        build_time = %deployment.timestamp,
        "relay server starting"
    );

    let metrics_handle =
        relay_server::metrics::install_recorder().context("Failed to install metrics recorder")?;

    let config = ServerConfig::from(&settings);
    let server = RelayServer::new(config, deployment, metrics_handle)
        .context("Invalid server configuration")?;
    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!("relay listening on http://{addr} (ws://{addr}/ws/{{username}})");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.stop(handle).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
