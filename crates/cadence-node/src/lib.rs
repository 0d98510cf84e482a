//! # Cadence Node
//!
//! One member of a replicated calculation cluster, plus the client-side pieces
//! (router, coordinator) that drive it.
//!
//! ## Architecture
//! ```text
//! Client → RequestRouter ──RPC──→ leader NodeService ──→ calc
//!                                      │
//!             GossipExchange ──ClockSync──→ random peer
//!             TwoPhaseCoordinator ──prepare/commit/abort──→ participants
//! ```

pub mod cluster;
pub mod config;
pub mod fault;
pub mod leader;
pub mod monitor;
pub mod router;
pub mod routes;
pub mod rpc;
pub mod service;
pub mod state;
pub mod txn;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize structured logging with tracing. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()?;
    }

    Ok(())
}
