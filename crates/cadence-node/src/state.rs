//! Application state and shared resources.

use anyhow::{Context, Result};
use cadence_common::ScalarClock;
use std::sync::Arc;

use crate::cluster::GossipExchange;
use crate::config::AppConfig;
use crate::fault;
use crate::leader::{FileStore, LeaderDirectory, PointerStore, RedisStore};
use crate::monitor::MonitorSink;
use crate::rpc::{HttpChannel, LocalChannel, RpcChannel};
use crate::service::NodeService;
use crate::txn::{TransactionJanitor, TransactionManager, TwoPhaseCoordinator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,

    /// RPC handlers owning the node's clocks, leader pointer and participant ledger
    pub service: Arc<NodeService>,

    /// Coordinator-side transaction table
    pub transactions: Arc<TransactionManager>,

    /// `None` when fewer than two servers are configured
    pub coordinator: Option<Arc<TwoPhaseCoordinator>>,

    /// One channel per configured server; this node's own entry is in-process
    pub channels: Vec<Arc<dyn RpcChannel>>,
}

impl AppState {
    /// Build state from configuration, connecting to Redis when a URL is set
    pub async fn new(config: AppConfig) -> Result<Self> {
        let store: Arc<dyn PointerStore> = match &config.redis_url {
            Some(url) => Arc::new(
                RedisStore::connect(url, &config.node_id)
                    .await
                    .context("Failed to connect leader store to Redis")?,
            ),
            None => Arc::new(FileStore::new(&config.leader_file)),
        };

        let leader = Arc::new(
            LeaderDirectory::open(store, &config.default_leader, config.backup_ports.clone()).await,
        );

        let address = config.advertise_address();
        let service = Arc::new(NodeService::new(
            config.node_id.clone(),
            address.clone(),
            &config.servers,
            Arc::new(ScalarClock::new()),
            leader,
            fault::from_config(&config.faults),
            MonitorSink::new(config.monitor_url.clone()),
            config.divergence_threshold,
        ));

        let mut channels: Vec<Arc<dyn RpcChannel>> = Vec::with_capacity(config.servers.len());
        for server in &config.servers {
            if server.trim_end_matches('/').eq_ignore_ascii_case(&address) {
                channels.push(Arc::new(LocalChannel::new(service.clone())));
            } else {
                let channel = HttpChannel::new(server.clone(), config.rpc_timeout())
                    .with_context(|| format!("Failed to build RPC channel for {server}"))?;
                channels.push(Arc::new(channel));
            }
        }

        Ok(Self::from_parts(config, service, channels))
    }

    /// Assemble state around an existing service and channel set
    pub fn from_parts(
        config: AppConfig,
        service: Arc<NodeService>,
        channels: Vec<Arc<dyn RpcChannel>>,
    ) -> Self {
        let transactions = Arc::new(TransactionManager::new());

        let coordinator = match channels.as_slice() {
            [first, second, ..] => Some(Arc::new(TwoPhaseCoordinator::new(
                transactions.clone(),
                first.clone(),
                second.clone(),
                service.clock().clone(),
                config.coordinator(),
            ))),
            _ => {
                tracing::warn!(servers = channels.len(), "Fewer than two servers, 2PC disabled");
                None
            }
        };

        Self {
            config: Arc::new(config),
            service,
            transactions,
            coordinator,
            channels,
        }
    }

    /// Gossip exchange over every configured server except this one
    pub fn gossip(&self) -> GossipExchange {
        GossipExchange::new(
            self.service.clone(),
            self.channels.clone(),
            std::time::Duration::from_secs(self.config.gossip.interval_secs),
            self.config.rpc_timeout(),
        )
    }

    /// Pruner for this node's transaction table and participant ledger
    pub fn janitor(&self) -> TransactionJanitor {
        TransactionJanitor::new(
            self.transactions.clone(),
            self.service.ledger().clone(),
            self.config.cleanup(),
        )
    }
}
