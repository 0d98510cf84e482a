//! Vector clock with a rollback stack.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Causal relationship between two vector clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    Before,
    After,
    Equal,
    Concurrent,
}

/// Per-node causal counters owned by one logical actor.
///
/// The self entry only moves forward through [`VectorClock::increment`], or back
/// through an explicit [`VectorClock::rollback`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorClock {
    node_id: String,
    counters: BTreeMap<String, u64>,
    #[serde(skip)]
    history: Vec<BTreeMap<String, u64>>,
}

impl VectorClock {
    pub fn new(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        let mut counters = BTreeMap::new();
        counters.insert(node_id.clone(), 0);
        Self {
            node_id,
            counters,
            history: Vec::new(),
        }
    }

    /// Create a clock with a zero entry for every id in `all_nodes` (plus self)
    pub fn with_nodes<I, S>(node_id: impl Into<String>, all_nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut clock = Self::new(node_id);
        for id in all_nodes {
            clock.counters.entry(id.into()).or_insert(0);
        }
        clock
    }

    /// Rebuild from a snapshot received on the wire
    pub fn from_snapshot(node_id: impl Into<String>, counters: BTreeMap<String, u64>) -> Self {
        let mut clock = Self::new(node_id);
        clock.counters.extend(counters);
        clock
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn get(&self, node_id: &str) -> u64 {
        self.counters.get(node_id).copied().unwrap_or(0)
    }

    /// Local event: save the prior state, then bump the self entry
    pub fn increment(&mut self) -> u64 {
        self.history.push(self.counters.clone());
        let entry = self.counters.entry(self.node_id.clone()).or_insert(0);
        *entry = entry.saturating_add(1);
        *entry
    }

    /// Raise `node_id`'s entry to at least `value` without touching history
    pub fn observe(&mut self, node_id: &str, value: u64) {
        let entry = self.counters.entry(node_id.to_string()).or_insert(0);
        *entry = (*entry).max(value);
    }

    /// Pointwise max with `incoming`. Does not advance the self entry.
    pub fn merge(&mut self, incoming: &BTreeMap<String, u64>) {
        for (id, &value) in incoming {
            self.observe(id, value);
        }
    }

    /// Restore the state saved by the most recent `increment`
    pub fn rollback(&mut self) -> bool {
        match self.history.pop() {
            Some(previous) => {
                self.counters = previous;
                true
            }
            None => false,
        }
    }

    pub fn history_depth(&self) -> usize {
        self.history.len()
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.clone()
    }

    pub fn counters(&self) -> &BTreeMap<String, u64> {
        &self.counters
    }

    pub fn compare(&self, other: &VectorClock) -> CausalOrder {
        let mut less = false;
        let mut greater = false;
        for id in self.counters.keys().chain(other.counters.keys()) {
            match self.get(id).cmp(&other.get(id)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        match (less, greater) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            (true, true) => CausalOrder::Concurrent,
        }
    }
}

/// Entries equal when every known counter matches; absent ids count as zero.
impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Equal
    }
}

impl Eq for VectorClock {}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(node: &str, entries: &[(&str, u64)]) -> VectorClock {
        let counters = entries.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        VectorClock::from_snapshot(node, counters)
    }

    #[test]
    fn test_merge_is_pointwise_max_and_does_not_tick() {
        let mut a = clock("a", &[("a", 3), ("b", 1)]);
        let b = clock("b", &[("a", 1), ("b", 4), ("c", 2)]);

        a.merge(b.counters());
        assert_eq!(a.get("a"), 3);
        assert_eq!(a.get("b"), 4);
        assert_eq!(a.get("c"), 2);
        assert_eq!(a.history_depth(), 0);
    }

    #[test]
    fn test_merge_is_idempotent_and_commutative() {
        let a = clock("a", &[("a", 5), ("b", 1)]);
        let b = clock("b", &[("b", 7), ("c", 3)]);

        let mut ab = a.clone();
        ab.merge(b.counters());
        let mut abb = ab.clone();
        abb.merge(b.counters());
        assert_eq!(abb, ab);

        let mut ba = b.clone();
        ba.merge(a.counters());
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_rollback_restores_previous_state() {
        let mut a = VectorClock::with_nodes("a", ["a", "b"]);
        a.increment();
        a.increment();
        assert_eq!(a.get("a"), 2);

        assert!(a.rollback());
        assert_eq!(a.get("a"), 1);
        assert!(a.rollback());
        assert_eq!(a.get("a"), 0);
        assert!(!a.rollback());
    }

    #[test]
    fn test_causal_order() {
        let a = clock("a", &[("a", 1), ("b", 0)]);
        let b = clock("b", &[("a", 1), ("b", 1)]);
        let c = clock("c", &[("a", 2), ("b", 0)]);

        assert_eq!(a.compare(&b), CausalOrder::Before);
        assert_eq!(b.compare(&a), CausalOrder::After);
        assert_eq!(b.compare(&c), CausalOrder::Concurrent);
        assert_eq!(a.compare(&a.clone()), CausalOrder::Equal);
    }

    #[test]
    fn test_serialization_skips_history() {
        let mut a = VectorClock::new("a");
        a.increment();
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("history"));

        let parsed: VectorClock = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.get("a"), 1);
        assert_eq!(parsed.history_depth(), 0);
    }
}
