//! Matrix clock: what each node is believed to know about every other node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::vector::VectorClock;

/// Row `r`, column `c` holds what node `r` is believed to know of node `c`'s time.
///
/// The self diagonal mirrors the process's scalar clock. Only used for staleness and
/// divergence diagnostics; commit decisions never consult it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixClock {
    node_id: String,
    rows: BTreeMap<String, VectorClock>,
}

impl MatrixClock {
    pub fn new<I, S>(node_id: impl Into<String>, all_nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let node_id = node_id.into();
        let mut ids: Vec<String> = all_nodes.into_iter().map(Into::into).collect();
        if !ids.contains(&node_id) {
            ids.push(node_id.clone());
        }

        let rows = ids
            .iter()
            .map(|row| (row.clone(), VectorClock::with_nodes(row.clone(), ids.clone())))
            .collect();

        Self { node_id, rows }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn get(&self, row: &str, column: &str) -> u64 {
        self.rows.get(row).map(|r| r.get(column)).unwrap_or(0)
    }

    /// Local event on the self diagonal
    pub fn increment(&mut self) -> u64 {
        let id = self.node_id.clone();
        self.row_mut(&id).increment()
    }

    /// Raise the self diagonal to the process's scalar time
    pub fn observe_local(&mut self, scalar: u64) {
        let id = self.node_id.clone();
        self.row_mut(&id).observe(&id, scalar);
    }

    /// Note a peer's reported scalar time: we now know it, and so does the peer.
    pub fn record_peer(&mut self, peer: &str, value: u64) {
        let id = self.node_id.clone();
        self.row_mut(&id).observe(peer, value);
        self.row_mut(peer).observe(peer, value);
    }

    /// Pointwise max over every row and column; unknown ids are added
    pub fn merge(&mut self, other: &MatrixClock) {
        for (row_id, row) in &other.rows {
            self.row_mut(row_id).merge(row.counters());
        }
    }

    /// This node's own view, suitable for a monitoring snapshot
    pub fn own_row(&self) -> BTreeMap<String, u64> {
        self.rows
            .get(&self.node_id)
            .map(VectorClock::snapshot)
            .unwrap_or_default()
    }

    /// Lowest time any row holds for `node`: every node is known to have seen at least this much.
    pub fn min_known(&self, node: &str) -> u64 {
        self.rows.values().map(|r| r.get(node)).min().unwrap_or(0)
    }

    /// How far `peer`'s believed knowledge of us trails our own diagonal
    pub fn staleness(&self, peer: &str) -> u64 {
        let own = self.get(&self.node_id, &self.node_id);
        own.saturating_sub(self.get(peer, &self.node_id))
    }

    /// Staleness for every peer row
    pub fn staleness_report(&self) -> BTreeMap<String, u64> {
        self.rows
            .keys()
            .filter(|id| **id != self.node_id)
            .map(|id| (id.clone(), self.staleness(id)))
            .collect()
    }

    pub fn rows(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.rows
            .iter()
            .map(|(id, row)| (id.clone(), row.snapshot()))
            .collect()
    }

    fn row_mut(&mut self, row: &str) -> &mut VectorClock {
        self.rows
            .entry(row.to_string())
            .or_insert_with(|| VectorClock::new(row))
    }
}
