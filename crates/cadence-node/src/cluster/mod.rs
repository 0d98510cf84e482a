//! Cluster coordination modules.
//!
//! Implements:
//! - Clock gossip (pull-style Lamport reconciliation between peers)

mod gossip;

pub use gossip::{GossipConfig, GossipExchange, GossipRound};
