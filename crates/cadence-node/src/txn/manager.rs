//! Coordinator-side transaction state machine.

use cadence_common::{CadenceError, Operation};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

pub type TransactionId = u64;

/// Transaction lifecycle: `Created → Prepared → {Committed | Aborted}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TxnState {
    Created,
    Prepared,
    Committed,
    Aborted,
}

impl TxnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Prepared => "prepared",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }
}

/// One participant's part in a chained calculation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub participant: String,
    pub operation: Operation,
}

/// A chained calculation under two-phase commit
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub operand: i64,
    /// Ordered plan; the participant set is fixed here at creation
    pub steps: Vec<Step>,
    pub intermediate_result: Option<i64>,
    pub votes: HashMap<String, bool>,
    pub state: TxnState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Every declared participant voted yes and nobody voted no
    pub fn all_votes_yes(&self) -> bool {
        self.votes.values().all(|&v| v)
            && self
                .steps
                .iter()
                .all(|s| self.votes.get(&s.participant).copied().unwrap_or(false))
    }

    fn ensure_open(&self) -> Result<(), CadenceError> {
        if self.state.is_terminal() {
            return Err(CadenceError::TransactionTerminal {
                id: self.id,
                state: self.state.name().to_string(),
            });
        }
        Ok(())
    }
}

/// Concurrent id-keyed transaction table.
///
/// Each transaction sits behind its own mutex, so votes from different participants
/// serialize per transaction while unrelated transactions proceed in parallel.
pub struct TransactionManager {
    transactions: RwLock<HashMap<TransactionId, Arc<Mutex<Transaction>>>>,
    next_id: AtomicU64,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a transaction with an empty vote map
    pub async fn create(&self, operand: i64, steps: Vec<Step>) -> TransactionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let txn = Transaction {
            id,
            operand,
            steps,
            intermediate_result: None,
            votes: HashMap::new(),
            state: TxnState::Created,
            abort_reason: None,
            created_at: Utc::now(),
        };

        let plan: Vec<String> = txn
            .steps
            .iter()
            .map(|s| format!("{}@{}", s.operation, s.participant))
            .collect();
        tracing::info!(txn = id, operand, plan = ?plan, "Transaction created");

        self.transactions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(txn)));
        id
    }

    /// Record (or overwrite) a participant's vote. Does not change state.
    pub async fn prepare(
        &self,
        id: TransactionId,
        participant: &str,
        vote: bool,
    ) -> Result<(), CadenceError> {
        let entry = self.entry(id).await?;
        let mut txn = entry.lock().await;
        txn.ensure_open()?;
        txn.votes.insert(participant.to_string(), vote);

        tracing::info!(txn = id, participant = %participant, vote, "Vote recorded");
        Ok(())
    }

    /// Move to `Prepared` once the prepare phase has collected its votes
    pub async fn mark_prepared(&self, id: TransactionId) -> Result<(), CadenceError> {
        let entry = self.entry(id).await?;
        let mut txn = entry.lock().await;
        txn.ensure_open()?;
        txn.state = TxnState::Prepared;
        Ok(())
    }

    /// Commit if every declared participant voted yes; otherwise abort and fail.
    ///
    /// Repeating a commit on a committed transaction is a no-op.
    pub async fn commit(&self, id: TransactionId) -> Result<(), CadenceError> {
        let entry = self.entry(id).await?;
        let mut txn = entry.lock().await;

        if txn.state == TxnState::Committed {
            return Ok(());
        }
        txn.ensure_open()?;

        if txn.all_votes_yes() {
            txn.state = TxnState::Committed;
            tracing::info!(txn = id, result = ?txn.intermediate_result, "Transaction COMMITTED");
            Ok(())
        } else {
            let reason = "not all participants voted yes";
            txn.state = TxnState::Aborted;
            txn.abort_reason = Some(reason.to_string());
            tracing::warn!(txn = id, votes = ?txn.votes, "Transaction ABORTED: {}", reason);
            Err(CadenceError::LogicalFailure(reason.to_string()))
        }
    }

    /// Mark aborted from any non-terminal state. Repeating on an aborted transaction is a no-op.
    pub async fn abort(&self, id: TransactionId, reason: &str) -> Result<(), CadenceError> {
        let entry = self.entry(id).await?;
        let mut txn = entry.lock().await;

        if txn.state == TxnState::Aborted {
            return Ok(());
        }
        txn.ensure_open()?;

        txn.state = TxnState::Aborted;
        txn.abort_reason = Some(reason.to_string());
        tracing::warn!(txn = id, reason = %reason, "Transaction ABORTED");
        Ok(())
    }

    /// Store the first step's result so the next step can use it as its operand
    pub async fn set_intermediate_result(
        &self,
        id: TransactionId,
        value: i64,
    ) -> Result<(), CadenceError> {
        let entry = self.entry(id).await?;
        let mut txn = entry.lock().await;
        txn.ensure_open()?;
        txn.intermediate_result = Some(value);
        Ok(())
    }

    pub async fn get(&self, id: TransactionId) -> Option<Transaction> {
        let entry = self.transactions.read().await.get(&id).cloned()?;
        let txn = entry.lock().await;
        Some(txn.clone())
    }

    /// Drop committed and aborted transactions created at least `retention` ago;
    /// returns how many were removed
    pub async fn cleanup_terminal(&self, retention: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(retention)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            return 0;
        };
        let mut map = self.transactions.write().await;
        let mut expired = Vec::new();
        for (id, entry) in map.iter() {
            let txn = entry.lock().await;
            if txn.state.is_terminal() && txn.created_at <= cutoff {
                expired.push(*id);
            }
        }
        for id in &expired {
            map.remove(id);
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    async fn entry(&self, id: TransactionId) -> Result<Arc<Mutex<Transaction>>, CadenceError> {
        self.transactions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CadenceError::NotFound(id))
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn plan() -> Vec<Step> {
        vec![
            Step {
                participant: "A".to_string(),
                operation: Operation::Square,
            },
            Step {
                participant: "B".to_string(),
                operation: Operation::Cube,
            },
        ]
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_increasing() {
        let manager = TransactionManager::new();
        let a = manager.create(1, plan()).await;
        let b = manager.create(2, plan()).await;
        assert!(b > a);
        assert_eq!(manager.get(a).await.unwrap().state, TxnState::Created);
        assert!(manager.get(a).await.unwrap().votes.is_empty());
    }

    #[tokio::test]
    async fn test_commit_with_a_no_vote_aborts() {
        let manager = TransactionManager::new();
        let id = manager.create(4, plan()).await;
        assert_ok!(manager.prepare(id, "A", true).await);
        assert_ok!(manager.prepare(id, "B", false).await);

        let err = assert_err!(manager.commit(id).await);
        assert_eq!(
            err,
            CadenceError::LogicalFailure("not all participants voted yes".to_string())
        );

        let txn = manager.get(id).await.unwrap();
        assert_eq!(txn.state, TxnState::Aborted);
        assert_eq!(txn.abort_reason.as_deref(), Some("not all participants voted yes"));
    }

    #[tokio::test]
    async fn test_commit_requires_every_declared_participant() {
        let manager = TransactionManager::new();
        let id = manager.create(4, plan()).await;
        assert_ok!(manager.prepare(id, "A", true).await);

        // B never voted
        assert_err!(manager.commit(id).await);
        assert_eq!(manager.get(id).await.unwrap().state, TxnState::Aborted);
    }

    #[tokio::test]
    async fn test_repeat_vote_overwrites() {
        let manager = TransactionManager::new();
        let id = manager.create(4, plan()).await;
        assert_ok!(manager.prepare(id, "A", false).await);
        assert_ok!(manager.prepare(id, "A", true).await);
        assert_ok!(manager.prepare(id, "B", true).await);
        assert_ok!(manager.mark_prepared(id).await);

        assert_ok!(manager.commit(id).await);
        assert_eq!(manager.get(id).await.unwrap().state, TxnState::Committed);
        // Idempotent
        assert_ok!(manager.commit(id).await);
    }

    #[tokio::test]
    async fn test_terminal_states_are_irreversible() {
        let manager = TransactionManager::new();
        let id = manager.create(4, plan()).await;
        assert_ok!(manager.abort(id, "operator request").await);
        assert_ok!(manager.abort(id, "again").await);

        assert!(matches!(
            manager.prepare(id, "A", true).await,
            Err(CadenceError::TransactionTerminal { .. })
        ));
        assert_err!(manager.commit(id).await);
        assert_err!(manager.set_intermediate_result(id, 16).await);
        assert_eq!(
            manager.get(id).await.unwrap().abort_reason.as_deref(),
            Some("operator request")
        );

        let committed = manager.create(4, plan()).await;
        assert_ok!(manager.prepare(committed, "A", true).await);
        assert_ok!(manager.prepare(committed, "B", true).await);
        assert_ok!(manager.commit(committed).await);
        assert_err!(manager.abort(committed, "too late").await);
        assert_eq!(manager.get(committed).await.unwrap().state, TxnState::Committed);
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_not_found() {
        let manager = TransactionManager::new();
        assert_eq!(manager.commit(99).await, Err(CadenceError::NotFound(99)));
        assert_eq!(manager.abort(99, "x").await, Err(CadenceError::NotFound(99)));
        assert!(manager.get(99).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_votes_are_all_recorded() {
        let manager = Arc::new(TransactionManager::new());
        let steps: Vec<Step> = (0..32)
            .map(|i| Step {
                participant: format!("p{i}"),
                operation: Operation::Square,
            })
            .collect();
        let id = manager.create(2, steps).await;

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.prepare(id, &format!("p{i}"), true).await })
            })
            .collect();
        for handle in handles {
            assert_ok!(handle.await.unwrap());
        }

        assert_eq!(manager.get(id).await.unwrap().votes.len(), 32);
        assert_ok!(manager.commit(id).await);
    }

    #[tokio::test]
    async fn test_cleanup_terminal() {
        let manager = TransactionManager::new();
        let open = manager.create(1, plan()).await;
        let done = manager.create(2, plan()).await;
        assert_ok!(manager.abort(done, "x").await);

        assert_eq!(manager.cleanup_terminal(Duration::from_secs(3600)).await, 0);
        assert_eq!(manager.cleanup_terminal(Duration::ZERO).await, 1);
        assert_eq!(manager.len().await, 1);
        assert!(manager.get(open).await.is_some());
    }
}
