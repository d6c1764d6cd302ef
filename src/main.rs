//! # subwire
//!
//! Server binary: loads settings, installs logging, and serves GraphQL
//! subscriptions backed by the in-process topic registry.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use subwire_broadcast::PubSub;
use subwire_server::{ServerConfig, StreamingOrchestrator, SubwireServer, TopicExecutor};
use subwire_telemetry::{init_telemetry, TelemetryConfig};
use tracing::Level;

/// GraphQL subscription server.
#[derive(Parser, Debug)]
#[command(name = "subwire", about = "GraphQL subscriptions over WebSocket")]
struct Cli {
    /// Settings file (defaults to `~/.subwire/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => subwire_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => subwire_settings::load_settings().context("Failed to load settings")?,
    };
    if let Some(host) = cli.host {
        settings.server.host = host;
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    let log_level = settings.logging.level.parse::<Level>().unwrap_or_else(|_| {
        eprintln!(
            "subwire: unknown log level {:?}, using info",
            settings.logging.level
        );
        Level::INFO
    });
    let _telemetry = init_telemetry(&TelemetryConfig {
        log_level,
        format: settings.logging.format,
        ..TelemetryConfig::default()
    });

    let pubsub = Arc::new(PubSub::with_policy(settings.hub.buffer));
    let executor = Arc::new(TopicExecutor::new(pubsub));
    let orchestrator = Arc::new(StreamingOrchestrator::new(executor));

    let server = SubwireServer::new(ServerConfig::from_settings(&settings), orchestrator);
    let handle = server.listen().await.context("Failed to start server")?;
    tracing::info!(
        addr = %handle.addr(),
        path = %server.config().path,
        "subwire listening"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if handle.stop().await {
        tracing::info!("Shutdown complete");
    } else {
        tracing::warn!("Shutdown timed out with sessions still open");
    }
    Ok(())
}
