//! # Cadence Client
//!
//! Non-interactive producer for a Cadence cluster. Routes calculations to the
//! believed leader and coordinates chained `square → cube` transactions.
//!
//! ## Usage
//! ```bash
//! cadence-client square 7
//! cadence-client --servers http://127.0.0.1:5001,http://127.0.0.1:5002 txn 4
//! cadence-client leader
//! ```

use anyhow::{Context, Result};
use cadence_common::{
    CalculationResponse, Operation, ScalarClock,
    constants::{DEFAULT_SERVERS, ROUTER_MAX_RETRIES, RPC_CALL_TIMEOUT_MS},
};
use cadence_node::init_logging;
use cadence_node::leader::FileStore;
use cadence_node::monitor::MonitorSink;
use cadence_node::router::RequestRouter;
use cadence_node::rpc::http_channels;
use cadence_node::txn::{CoordinatorConfig, TransactionManager, TwoPhaseCoordinator};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const CLIENT_ID: &str = "client";

/// Cadence command-line client
#[derive(Parser, Debug)]
#[command(name = "cadence-client")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Servers in round-robin order; the first two are the 2PC participants
    #[arg(
        long,
        env = "CADENCE_SERVERS",
        value_delimiter = ',',
        default_values_t = default_servers()
    )]
    servers: Vec<String>,

    /// Client-side leader pointer file
    #[arg(long, default_value = "client_leader.json", env = "CADENCE_LEADER_FILE")]
    leader_file: String,

    /// Dashboard base URL for clock reports
    #[arg(long, env = "MONITOR_URL")]
    monitor_url: Option<String>,

    /// Communication failures tolerated before giving up
    #[arg(long, default_value_t = ROUTER_MAX_RETRIES)]
    retries: u32,

    /// Per-call timeout in milliseconds
    #[arg(long, default_value_t = RPC_CALL_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Square a non-negative number on the leader
    Square { operand: i64 },
    /// Cube a non-negative number on the leader
    Cube { operand: i64 },
    /// Two-phase `square` then `cube` across the first two servers
    Txn { operand: i64 },
    /// Show the client's believed leader
    Leader,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(&args.log_level, false)?;
    tracing::debug!(servers = ?args.servers, leader_file = %args.leader_file, "Client starting");

    let timeout = Duration::from_millis(args.timeout_ms);
    let channels = http_channels(&args.servers, timeout).context("Invalid server list")?;
    let clock = Arc::new(ScalarClock::new());
    let monitor = MonitorSink::new(args.monitor_url.clone());

    match args.command {
        Command::Square { operand } => {
            let router = router(channels, &args.leader_file, timeout).await?;
            calculate(&router, &clock, Operation::Square, operand, args.retries).await?;
        }
        Command::Cube { operand } => {
            let router = router(channels, &args.leader_file, timeout).await?;
            calculate(&router, &clock, Operation::Cube, operand, args.retries).await?;
        }
        Command::Txn { operand } => {
            let [first, second, ..] = channels.as_slice() else {
                anyhow::bail!("two servers are required for a transaction");
            };
            let coordinator = TwoPhaseCoordinator::new(
                Arc::new(TransactionManager::new()),
                first.clone(),
                second.clone(),
                clock.clone(),
                CoordinatorConfig {
                    call_timeout: timeout,
                    ..CoordinatorConfig::default()
                },
            );

            let outcome = coordinator.run(operand).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Leader => {
            let router = router(channels, &args.leader_file, timeout).await?;
            println!("{}", router.current_leader().await);
            return Ok(());
        }
    }

    println!("Local clock: {}", clock.now());
    monitor
        .push(CLIENT_ID, BTreeMap::from([(CLIENT_ID.to_string(), clock.now())]))
        .await;
    Ok(())
}

fn default_servers() -> Vec<String> {
    DEFAULT_SERVERS.iter().map(|s| s.to_string()).collect()
}

async fn router(
    channels: Vec<Arc<dyn cadence_node::rpc::RpcChannel>>,
    leader_file: &str,
    timeout: Duration,
) -> Result<RequestRouter> {
    RequestRouter::new(channels, Arc::new(FileStore::new(leader_file)), timeout)
        .await
        .context("Failed to build request router")
}

async fn calculate(
    router: &RequestRouter,
    clock: &ScalarClock,
    op: Operation,
    operand: i64,
    retries: u32,
) -> Result<()> {
    let timestamp = clock.increment();
    let response: CalculationResponse = router
        .execute(operand, op, timestamp, retries)
        .await
        .with_context(|| format!("{op} {operand} failed"))?;
    clock.on_receive(response.timestamp);

    if response.success {
        println!("{op}({operand}) = {}", response.result);
    } else {
        println!("{op}({operand}) not served: {}", response.message);
        if let Some(leader) = &response.redirect_to {
            println!("Leader hint: {leader}");
        }
    }
    Ok(())
}
