//! Two-phase commit for chained calculations.
//!
//! - `manager`: coordinator-side transaction state machine
//! - `participant`: participant-side staging of prepared operations
//! - `coordinator`: the prepare/execute protocol driven over RPC channels
//! - `janitor`: periodic pruning of settled entries on both sides

mod coordinator;
mod janitor;
mod manager;
mod participant;

pub use coordinator::{CoordinatorConfig, TransactionOutcome, TwoPhaseCoordinator};
pub use janitor::{CleanupConfig, Sweep, TransactionJanitor};
pub use manager::{Step, Transaction, TransactionId, TransactionManager, TxnState};
pub use participant::{ParticipantLedger, ParticipantState};
