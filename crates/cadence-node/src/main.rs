//! # cadence-node
//!
//! Serves the calculation RPCs, participates in 2PC, and gossips its clock.

use anyhow::{Context, Result};
use cadence_node::config::{AppConfig, Overrides};
use cadence_node::state::AppState;
use cadence_node::{init_logging, routes};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

/// Cadence calculation node
#[derive(Parser, Debug)]
#[command(name = "cadence-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/cadence.toml")]
    config: String,

    /// Node identifier (overrides config)
    #[arg(long, env = "NODE_ID")]
    node_id: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Address peers use to reach this node (overrides config)
    #[arg(long, env = "ADVERTISE_ADDR")]
    advertise: Option<String>,

    /// Redis URL for the leader pointer (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Dashboard base URL for clock reports (overrides config)
    #[arg(long, env = "MONITOR_URL")]
    monitor_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            node_id: self.node_id.clone(),
            listen_addr: self.listen.clone(),
            advertise_addr: self.advertise.clone(),
            redis_url: self.redis_url.clone(),
            monitor_url: self.monitor_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.json_logs)?;

    info!("⏱️ Starting Cadence node v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args.overrides())?;
    info!(
        node = %config.node_id,
        address = %config.advertise_address(),
        servers = ?config.servers,
        "📋 Configuration loaded from {}",
        args.config
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let state = AppState::new(config.clone()).await?;
    info!(
        leader = %state.service.leader().current_leader().await,
        store = %state.service.leader().store_description(),
        "✅ Leader pointer loaded"
    );

    // Spawn clock gossip
    if config.gossip.enabled {
        let gossip = Arc::new(state.gossip());
        let gossip_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            gossip.run(gossip_shutdown).await;
        });
    }

    // Spawn settled-transaction cleanup
    let janitor = state.janitor();
    let janitor_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        janitor.run(janitor_shutdown).await;
    });

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("🚀 Cadence node listening on {}", config.listen_addr);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("👋 Cadence node shutdown complete");
    Ok(())
}
