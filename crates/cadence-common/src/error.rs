//! Common error types for Cadence components.

use thiserror::Error;

/// Common errors across Cadence components
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CadenceError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Peer or leader is transiently unreachable (connection refused, not listening)
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Any other RPC fault (bad status, malformed body, transport reset)
    #[error("Communication failure: {0}")]
    Communication(String),

    /// A single call exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Request is well-formed but cannot be honoured (negative operand, overflow, negative vote)
    #[error("Logical failure: {0}")]
    LogicalFailure(String),

    /// Unknown transaction id
    #[error("Transaction {0} not found")]
    NotFound(u64),

    /// Transaction already committed or aborted
    #[error("Transaction {id} is already {state}")]
    TransactionTerminal { id: u64, state: String },

    /// Durable pointer store could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Router exhausted its retry budget
    #[error("All servers are unavailable")]
    AllServersUnavailable,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CadenceError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Unavailable(_) => 503,
            Self::Communication(_) => 502,
            Self::Timeout(_) => 504,
            Self::LogicalFailure(_) => 422,
            Self::NotFound(_) => 404,
            Self::TransactionTerminal { .. } => 409,
            Self::Persistence(_) => 500,
            Self::AllServersUnavailable => 503,
            Self::Internal(_) => 500,
        }
    }

    /// Returns true if the prepare phase should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    /// Returns true if this error means the peer could not be talked to at all
    pub fn is_communication_failure(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Communication(_) | Self::Timeout(_)
        )
    }
}
