//! Logical clocks.
//!
//! - [`ScalarClock`]: Lamport time, one per process, safe to share between tasks
//! - [`VectorClock`]: per-node counters with a rollback stack, single owner
//! - [`MatrixClock`]: each peer's believed vector, for staleness diagnostics only

mod matrix;
mod scalar;
mod vector;

pub use matrix::MatrixClock;
pub use scalar::ScalarClock;
pub use vector::{CausalOrder, VectorClock};
