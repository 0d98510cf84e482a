//! Participant-side 2PC staging.
//!
//! Handles prepare/commit/abort requests from a coordinator. The staged operation is
//! executed at commit time with whatever operand the coordinator supplies, so the
//! second participant of a chain can run on the first participant's result.
//!
//! Entries are keyed by `(coordinator_id, transaction_id)`: every coordinator numbers
//! its own transactions, so the bare id alone is ambiguous across coordinators.

use cadence_common::{CadenceError, Operation, calculate};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Prepared,
    Committed,
    Aborted,
}

#[derive(Debug, Clone)]
struct Staged {
    operation: Option<Operation>,
    state: ParticipantState,
    result: Option<i64>,
    /// Set once the entry reaches `Committed` or `Aborted`
    settled_at: Option<Instant>,
}

impl Staged {
    fn settle(&mut self, state: ParticipantState) {
        self.state = state;
        self.settled_at = Some(Instant::now());
    }
}

type StagedKey = (String, TransactionId);

/// One per node
pub struct ParticipantLedger {
    staged: RwLock<HashMap<StagedKey, Staged>>,
}

impl ParticipantLedger {
    pub fn new() -> Self {
        Self {
            staged: RwLock::new(HashMap::new()),
        }
    }

    /// Validate and stage `operation`. A repeat prepare of a prepared transaction is accepted.
    pub async fn prepare(
        &self,
        coordinator: &str,
        id: TransactionId,
        operation: Operation,
        operand: i64,
    ) -> Result<(), CadenceError> {
        if operand < 0 {
            return Err(CadenceError::LogicalFailure(format!(
                "negative operand {operand} rejected"
            )));
        }

        let key = (coordinator.to_string(), id);
        let mut staged = self.staged.write().await;
        if let Some(existing) = staged.get(&key) {
            if existing.state != ParticipantState::Prepared {
                return Err(terminal(id, existing.state));
            }
        }

        staged.insert(
            key,
            Staged {
                operation: Some(operation),
                state: ParticipantState::Prepared,
                result: None,
                settled_at: None,
            },
        );
        Ok(())
    }

    /// Run the staged operation on `operand` and mark committed.
    ///
    /// A repeat commit returns the stored result. A failed calculation aborts the entry.
    pub async fn commit(
        &self,
        coordinator: &str,
        id: TransactionId,
        operand: i64,
    ) -> Result<i64, CadenceError> {
        let mut staged = self.staged.write().await;
        let entry = staged
            .get_mut(&(coordinator.to_string(), id))
            .ok_or(CadenceError::NotFound(id))?;

        match (entry.state, entry.result) {
            (ParticipantState::Committed, Some(result)) => return Ok(result),
            (ParticipantState::Prepared, _) => {}
            (state, _) => return Err(terminal(id, state)),
        }

        let operation = entry.operation.ok_or_else(|| {
            CadenceError::Internal(format!("transaction {id} staged without an operation"))
        })?;

        match calculate(operation, operand) {
            Ok(result) => {
                entry.settle(ParticipantState::Committed);
                entry.result = Some(result);
                Ok(result)
            }
            Err(e) => {
                entry.settle(ParticipantState::Aborted);
                Err(e)
            }
        }
    }

    /// Mark aborted. Unknown ids are recorded as aborted so a late prepare is refused.
    pub async fn abort(&self, coordinator: &str, id: TransactionId) -> Result<(), CadenceError> {
        let mut staged = self.staged.write().await;
        let entry = staged
            .entry((coordinator.to_string(), id))
            .or_insert(Staged {
                operation: None,
                state: ParticipantState::Aborted,
                result: None,
                settled_at: None,
            });

        if entry.state == ParticipantState::Committed {
            return Err(terminal(id, entry.state));
        }
        entry.settle(ParticipantState::Aborted);
        Ok(())
    }

    pub async fn state(&self, coordinator: &str, id: TransactionId) -> Option<ParticipantState> {
        self.staged
            .read()
            .await
            .get(&(coordinator.to_string(), id))
            .map(|s| s.state)
    }

    pub async fn pending_count(&self) -> usize {
        self.staged
            .read()
            .await
            .values()
            .filter(|s| s.state == ParticipantState::Prepared)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.staged.read().await.len()
    }

    /// Drop committed and aborted entries settled at least `retention` ago.
    /// Prepared entries are never pruned. Returns how many were removed.
    pub async fn cleanup_terminal(&self, retention: Duration) -> usize {
        let mut staged = self.staged.write().await;
        let before = staged.len();
        staged.retain(|_, entry| match entry.settled_at {
            Some(at) => at.elapsed() < retention,
            None => true,
        });
        before - staged.len()
    }
}

impl Default for ParticipantLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn terminal(id: TransactionId, state: ParticipantState) -> CadenceError {
    CadenceError::TransactionTerminal {
        id,
        state: format!("{state:?}").to_lowercase(),
    }
}
