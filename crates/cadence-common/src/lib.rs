//! # Cadence Common
//!
//! Shared types, clocks, and utilities used across Cadence components.
//!
//! ## Modules
//! - `clock` - Logical clocks (Scalar/Lamport, Vector, Matrix)
//! - `calc` - The closed operation kind and its pure calculation table
//! - `types` - RPC request/response shapes and persisted records
//! - `error` - Common error types
//! - `constants` - Shared configuration constants

pub mod calc;
pub mod clock;
pub mod constants;
pub mod error;
pub mod types;

pub use calc::{Operation, calculate};
pub use clock::{CausalOrder, MatrixClock, ScalarClock, VectorClock};
pub use error::CadenceError;
pub use types::*;
