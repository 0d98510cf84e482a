//! Clock Gossip Protocol
//!
//! Every interval, each node pulls the scalar clock of one randomly chosen peer and
//! merges it with Lamport receive semantics when the peer is ahead. Rounds run as
//! independent tasks so a slow peer never delays the next tick.

use cadence_common::{ClockSyncRequest, constants::GOSSIP_INTERVAL_SECS};
use chrono::{DateTime, Utc};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::rpc::{RpcChannel, with_deadline};
use crate::service::NodeService;

/// Gossip configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GossipConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Seconds between rounds
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            interval_secs: default_interval(),
        }
    }
}

fn default_enabled() -> bool { true }
fn default_interval() -> u64 { GOSSIP_INTERVAL_SECS }

/// Structured record of one completed round
#[derive(Debug, Clone, Serialize)]
pub struct GossipRound {
    pub peer: String,
    pub before: u64,
    pub remote: u64,
    pub after: u64,
    /// `|before − remote|`
    pub divergence: u64,
    /// Peer's own verdict against its divergence threshold
    pub diverged: bool,
    pub at: DateTime<Utc>,
}

/// Background clock exchange sharing the node's single clock
pub struct GossipExchange {
    service: Arc<NodeService>,
    peers: Vec<Arc<dyn RpcChannel>>,
    interval: Duration,
    call_timeout: Duration,
}

impl GossipExchange {
    /// Peers with the node's own address are dropped
    pub fn new(
        service: Arc<NodeService>,
        peers: Vec<Arc<dyn RpcChannel>>,
        interval: Duration,
        call_timeout: Duration,
    ) -> Self {
        let own = service.address().trim_end_matches('/').to_ascii_lowercase();
        let peers = peers
            .into_iter()
            .filter(|p| p.address().trim_end_matches('/').to_ascii_lowercase() != own)
            .collect();

        Self {
            service,
            peers,
            interval,
            call_timeout,
        }
    }

    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.peers.iter().map(|p| p.address())
    }

    /// Tick until shutdown. A round still in flight at shutdown may complete.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if self.peers.is_empty() {
            tracing::info!("🗣️ No gossip peers configured, exchange idle");
            return;
        }

        tracing::info!(
            peers = ?self.peers().collect::<Vec<_>>(),
            interval = ?self.interval,
            "🗣️ Clock gossip started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let exchange = self.clone();
                    tokio::spawn(async move {
                        exchange.run_round().await;
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("🗣️ Clock gossip shutting down");
                    break;
                }
            }
        }
    }

    /// One round against a random peer. `None` when there is no peer or the call failed.
    pub async fn run_round(&self) -> Option<GossipRound> {
        let peer = {
            let mut rng = rand::rng();
            self.peers.choose(&mut rng)?.clone()
        };

        let clock = self.service.clock();
        let before = clock.now();
        let request = ClockSyncRequest {
            current_clock: before,
        };

        let response = match with_deadline(self.call_timeout, peer.clock_sync(request)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(peer = %peer.address(), error = %e, "Gossip round failed");
                return None;
            }
        };

        let remote = response.synced_clock;
        let after = if remote > before {
            clock.on_receive(remote)
        } else {
            clock.now()
        };
        self.service.record_peer_clock(peer.address(), remote).await;

        let round = GossipRound {
            peer: peer.address().to_string(),
            before,
            remote,
            after,
            divergence: before.abs_diff(remote),
            diverged: response.diverged,
            at: Utc::now(),
        };

        if round.diverged {
            tracing::warn!(
                peer = %round.peer,
                before,
                remote,
                after,
                divergence = round.divergence,
                "Gossip round: clocks diverged"
            );
        } else {
            tracing::info!(
                peer = %round.peer,
                before,
                remote,
                after,
                divergence = round.divergence,
                "Gossip round"
            );
        }

        self.service.report_clock().await;
        Some(round)
    }
}
