//! Lamport scalar clock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lamport logical clock.
///
/// Mutation goes through atomic add / compare-and-swap so a single instance can be
/// shared by request handlers and the gossip task. Values saturate at `u64::MAX`.
pub struct ScalarClock {
    counter: AtomicU64,
}

impl ScalarClock {
    pub fn new() -> Self {
        Self::with_start(0)
    }

    pub fn with_start(start: u64) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }

    /// Current time, without ticking
    pub fn now(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Record a local event and return the new time
    pub fn increment(&self) -> u64 {
        self.update(|current| current.saturating_add(1))
    }

    /// Account for an inbound message stamped `remote`: `max(local, remote) + 1`.
    ///
    /// Call exactly once per accepted message, before processing it.
    pub fn on_receive(&self, remote: u64) -> u64 {
        self.update(|current| current.max(remote).saturating_add(1))
    }

    fn update(&self, next: impl Fn(u64) -> u64) -> u64 {
        let mut current = self.counter.load(Ordering::Acquire);
        loop {
            let proposed = next(current);
            match self.counter.compare_exchange_weak(
                current,
                proposed,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return proposed,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for ScalarClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScalarClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarClock").field("now", &self.now()).finish()
    }
}

impl fmt::Display for ScalarClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.now())
    }
}
