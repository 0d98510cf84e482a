//! Configuration management for a Cadence node.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use cadence_common::constants::{
    DEFAULT_BACKUP_PORTS, DEFAULT_LEADER, DEFAULT_LEADER_FILE, DEFAULT_LISTEN_ADDR,
    DEFAULT_SERVERS, DIVERGENCE_THRESHOLD, PREPARE_ATTEMPTS, PREPARE_BACKOFF_MS,
    RPC_CALL_TIMEOUT_MS, TXN_CLEANUP_INTERVAL_SECS, TXN_RETENTION_SECS,
};

use crate::cluster::GossipConfig;
use crate::fault::FaultConfig;
use crate::txn::{CleanupConfig, CoordinatorConfig};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// This node's unique ID (auto-generated if not set)
    #[serde(default = "generate_node_id")]
    pub node_id: String,

    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Address peers and the leader pointer know this node by (derived from `listen_addr` if unset)
    #[serde(default)]
    pub advertise_addr: Option<String>,

    /// Every node in the cluster, in round-robin order; the first two are 2PC participants
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,

    /// Leader assumed when no pointer is stored
    #[serde(default = "default_leader")]
    pub default_leader: String,

    /// Ordered failover ports
    #[serde(default = "default_backup_ports")]
    pub backup_ports: Vec<u16>,

    /// Leader pointer file, used when no Redis URL is set
    #[serde(default = "default_leader_file")]
    pub leader_file: String,

    /// Redis connection URL for the leader pointer
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Dashboard base URL for clock reports
    #[serde(default)]
    pub monitor_url: Option<String>,

    #[serde(default = "default_divergence_threshold")]
    pub divergence_threshold: u64,

    /// Per-call bound on node-to-node RPCs
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// Per-request bound on inbound HTTP handlers
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub gossip: GossipConfig,

    #[serde(default)]
    pub txn: TxnConfig,

    #[serde(default)]
    pub faults: FaultConfig,
}

/// Coordinator retry settings
#[derive(Debug, Clone, Deserialize)]
pub struct TxnConfig {
    #[serde(default = "default_prepare_attempts")]
    pub prepare_attempts: u32,

    /// Linear backoff unit in milliseconds
    #[serde(default = "default_prepare_backoff")]
    pub prepare_backoff_ms: u64,

    /// How often settled transactions are pruned
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// How long a settled transaction stays queryable before pruning
    #[serde(default = "default_retention")]
    pub retention_secs: u64,
}

impl Default for TxnConfig {
    fn default() -> Self {
        Self {
            prepare_attempts: default_prepare_attempts(),
            prepare_backoff_ms: default_prepare_backoff(),
            cleanup_interval_secs: default_cleanup_interval(),
            retention_secs: default_retention(),
        }
    }
}

/// Values from the command line or environment that win over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub node_id: Option<String>,
    pub listen_addr: Option<String>,
    pub advertise_addr: Option<String>,
    pub redis_url: Option<String>,
    pub monitor_url: Option<String>,
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_servers() -> Vec<String> { DEFAULT_SERVERS.iter().map(|s| s.to_string()).collect() }
fn default_leader() -> String { DEFAULT_LEADER.to_string() }
fn default_backup_ports() -> Vec<u16> { DEFAULT_BACKUP_PORTS.to_vec() }
fn default_leader_file() -> String { DEFAULT_LEADER_FILE.to_string() }
fn default_divergence_threshold() -> u64 { DIVERGENCE_THRESHOLD }
fn default_rpc_timeout() -> u64 { RPC_CALL_TIMEOUT_MS }
fn default_request_timeout() -> u64 { 30 }
fn default_prepare_attempts() -> u32 { PREPARE_ATTEMPTS }
fn default_prepare_backoff() -> u64 { PREPARE_BACKOFF_MS }
fn default_cleanup_interval() -> u64 { TXN_CLEANUP_INTERVAL_SECS }
fn default_retention() -> u64 { TXN_RETENTION_SECS }

fn generate_node_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    format!("node-{:08x}", rng.random::<u32>())
}

impl AppConfig {
    /// Load configuration from file and `CADENCE__*` environment variables, with CLI overrides
    pub fn load(config_path: &str, overrides: &Overrides) -> Result<Self> {
        let mut builder = config::Config::builder();
        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }

        let settings = builder
            .add_source(config::Environment::with_prefix("CADENCE").separator("__"))
            .build()
            .context("Failed to load config")?;
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to parse config")?;

        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: &Overrides) {
        if let Some(ref node_id) = overrides.node_id {
            self.node_id = node_id.clone();
        }
        if let Some(ref listen) = overrides.listen_addr {
            self.listen_addr = listen.clone();
        }
        if let Some(ref advertise) = overrides.advertise_addr {
            self.advertise_addr = Some(advertise.clone());
        }
        if let Some(ref redis_url) = overrides.redis_url {
            self.redis_url = Some(redis_url.clone());
        }
        if let Some(ref monitor_url) = overrides.monitor_url {
            self.monitor_url = Some(monitor_url.clone());
        }
    }

    fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            anyhow::bail!("at least one server must be configured");
        }
        if self.rpc_timeout_ms == 0 {
            anyhow::bail!("rpc_timeout_ms must be positive");
        }
        Ok(())
    }

    /// Address this node is known by, e.g. `http://127.0.0.1:5001`
    pub fn advertise_address(&self) -> String {
        match &self.advertise_addr {
            Some(addr) => addr.trim_end_matches('/').to_string(),
            None => format!("http://{}", self.listen_addr),
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            prepare_attempts: self.txn.prepare_attempts,
            prepare_backoff: Duration::from_millis(self.txn.prepare_backoff_ms),
            call_timeout: self.rpc_timeout(),
        }
    }

    pub fn cleanup(&self) -> CleanupConfig {
        CleanupConfig {
            interval: Duration::from_secs(self.txn.cleanup_interval_secs.max(1)),
            retention: Duration::from_secs(self.txn.retention_secs),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: generate_node_id(),
            listen_addr: default_listen_addr(),
            advertise_addr: None,
            servers: default_servers(),
            default_leader: default_leader(),
            backup_ports: default_backup_ports(),
            leader_file: default_leader_file(),
            redis_url: None,
            monitor_url: None,
            divergence_threshold: default_divergence_threshold(),
            rpc_timeout_ms: default_rpc_timeout(),
            request_timeout_secs: default_request_timeout(),
            gossip: GossipConfig::default(),
            txn: TxnConfig::default(),
            faults: FaultConfig::default(),
        }
    }
}
