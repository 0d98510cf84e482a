//! Locally believed leader pointer with port-based backup rotation.

use cadence_common::LeaderRecord;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::PointerStore;

/// Tracks and persists the node this process believes is authoritative.
///
/// Reads go through an `RwLock`; every promotion holds a single writer gate across
/// the pointer swap and the persist, so concurrent promotions never interleave.
pub struct LeaderDirectory {
    current: RwLock<String>,
    write_gate: Mutex<()>,
    backup_ports: Vec<u16>,
    store: Arc<dyn PointerStore>,
}

impl LeaderDirectory {
    /// Load the pointer from `store`, falling back to `default_leader` on missing or
    /// corrupt data. Never fails: persistence problems are logged.
    pub async fn open(
        store: Arc<dyn PointerStore>,
        default_leader: &str,
        backup_ports: Vec<u16>,
    ) -> Self {
        let leader = match store.load().await {
            Ok(Some(record)) => {
                tracing::info!(
                    leader = %record.leader,
                    store = %store.describe(),
                    "Loaded leader pointer"
                );
                record.leader
            }
            Ok(None) => {
                tracing::info!(
                    leader = %default_leader,
                    store = %store.describe(),
                    "No leader pointer stored, using default"
                );
                persist(store.as_ref(), default_leader).await;
                default_leader.to_string()
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    leader = %default_leader,
                    "Leader pointer unreadable, using default"
                );
                persist(store.as_ref(), default_leader).await;
                default_leader.to_string()
            }
        };

        Self {
            current: RwLock::new(leader),
            write_gate: Mutex::new(()),
            backup_ports,
            store,
        }
    }

    pub async fn current_leader(&self) -> String {
        self.current.read().await.clone()
    }

    /// Case-insensitive exact match (a trailing `/` is ignored)
    pub async fn is_leader(&self, address: &str) -> bool {
        same_address(&self.current.read().await, address)
    }

    /// Make `new_leader` the local pointer, persist it, and return the previous leader.
    ///
    /// A failed persist is logged; the in-memory pointer still moves.
    pub async fn promote(&self, new_leader: &str) -> String {
        let _gate = self.write_gate.lock().await;

        let previous = {
            let mut current = self.current.write().await;
            std::mem::replace(&mut *current, new_leader.to_string())
        };
        persist(self.store.as_ref(), new_leader).await;

        tracing::warn!(previous = %previous, leader = %new_leader, "Leader promoted");
        previous
    }

    /// Next entry after the current leader's port in the backup list, wrapping to the
    /// first entry when the port is last or absent. `None` when no backups are configured.
    pub async fn next_backup(&self) -> Option<String> {
        let current = self.current_leader().await;
        let first = *self.backup_ports.first()?;

        let position = port_of(&current)
            .and_then(|port| self.backup_ports.iter().position(|&b| b == port));
        let next = match position {
            Some(idx) if idx + 1 < self.backup_ports.len() => self.backup_ports[idx + 1],
            _ => first,
        };

        Some(with_port(&current, next))
    }

    pub fn backup_ports(&self) -> &[u16] {
        &self.backup_ports
    }

    /// Read the stored pointer back; fails when the store is unreachable or corrupt
    pub async fn check_store(&self) -> Result<(), cadence_common::CadenceError> {
        self.store.load().await.map(|_| ())
    }

    pub fn store_description(&self) -> String {
        self.store.describe()
    }
}

async fn persist(store: &dyn PointerStore, leader: &str) {
    let record = LeaderRecord {
        leader: leader.to_string(),
    };
    if let Err(e) = store.save(&record).await {
        tracing::error!(
            error = %e,
            leader = %leader,
            store = %store.describe(),
            "Failed to persist leader pointer"
        );
    }
}

fn same_address(a: &str, b: &str) -> bool {
    a.trim_end_matches('/').eq_ignore_ascii_case(b.trim_end_matches('/'))
}

/// Port component of an address such as `http://127.0.0.1:5001`
pub fn port_of(address: &str) -> Option<u16> {
    let trimmed = address.trim_end_matches('/');
    let (_, port) = trimmed.rsplit_once(':')?;
    port.parse().ok()
}

/// `address` with its port replaced (or appended when it has none)
fn with_port(address: &str, port: u16) -> String {
    let trimmed = address.trim_end_matches('/');
    match trimmed.rsplit_once(':') {
        Some((host, p)) if p.parse::<u16>().is_ok() => format!("{host}:{port}"),
        _ => format!("{trimmed}:{port}"),
    }
}
