//! Coordinator-driven two-phase commit for the `square → cube` chain.

use cadence_common::{
    AbortRequest, CadenceError, CommitRequest, Operation, PrepareRequest, ScalarClock,
    constants::{PREPARE_ATTEMPTS, PREPARE_BACKOFF_MS, RPC_CALL_TIMEOUT_MS},
};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::{Step, TransactionId, TransactionManager, TxnState};
use crate::rpc::{RpcChannel, with_deadline};

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Prepare attempts per participant
    pub prepare_attempts: u32,
    /// Linear backoff unit: attempt `n` waits `n × prepare_backoff`
    pub prepare_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            prepare_attempts: PREPARE_ATTEMPTS,
            prepare_backoff: Duration::from_millis(PREPARE_BACKOFF_MS),
            call_timeout: Duration::from_millis(RPC_CALL_TIMEOUT_MS),
        }
    }
}

/// Final report of one coordinated run
#[derive(Debug, Clone, Serialize)]
pub struct TransactionOutcome {
    pub coordinator_id: String,
    pub transaction_id: TransactionId,
    pub state: TxnState,
    pub result: Option<i64>,
    pub intermediate: Option<i64>,
    /// Coordinator clock when the transaction was created
    pub created_clock: u64,
    /// Coordinator clock after the last reply was merged
    pub clock: u64,
    pub message: String,
}

impl TransactionOutcome {
    pub fn committed(&self) -> bool {
        self.state == TxnState::Committed
    }
}

/// Drives prepare and execute across two participants: `Square` on the first,
/// `Cube` on the second with the first's result as its operand.
pub struct TwoPhaseCoordinator {
    id: String,
    manager: Arc<TransactionManager>,
    first: Arc<dyn RpcChannel>,
    second: Arc<dyn RpcChannel>,
    clock: Arc<ScalarClock>,
    config: CoordinatorConfig,
}

impl TwoPhaseCoordinator {
    pub fn new(
        manager: Arc<TransactionManager>,
        first: Arc<dyn RpcChannel>,
        second: Arc<dyn RpcChannel>,
        clock: Arc<ScalarClock>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            id: coordinator_id(),
            manager,
            first,
            second,
            clock,
            config,
        }
    }

    /// Scopes this coordinator's transaction ids on every participant
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    fn plan(&self) -> [(Operation, &Arc<dyn RpcChannel>); 2] {
        [
            (Operation::Square, &self.first),
            (Operation::Cube, &self.second),
        ]
    }

    /// Run one chained calculation to a terminal state.
    ///
    /// Errors only surface for coordinator bookkeeping problems; participant failures
    /// end in an `Aborted` outcome.
    pub async fn run(&self, operand: i64) -> Result<TransactionOutcome, CadenceError> {
        let steps = self
            .plan()
            .iter()
            .map(|(operation, channel)| Step {
                participant: channel.address().to_string(),
                operation: *operation,
            })
            .collect();

        let id = self.manager.create(operand, steps).await;
        let created_clock = self.clock.increment();

        // Phase 1: collect votes, stop at the first refusal
        for (operation, channel) in self.plan() {
            let (ready, message) = self.collect_vote(id, operation, operand, channel).await;
            self.manager.prepare(id, channel.address(), ready).await?;

            if !ready {
                let reason = format!("{} voted no: {message}", channel.address());
                return self.abort_all(id, created_clock, &reason).await;
            }
        }
        self.manager.mark_prepared(id).await?;

        // Phase 2: execute in order, feeding each result into the next step
        let mut value = operand;
        for (index, (operation, channel)) in self.plan().into_iter().enumerate() {
            match self.execute_step(id, channel, value).await {
                Ok(result) => {
                    tracing::info!(
                        txn = id,
                        op = %operation,
                        operand = value,
                        result,
                        participant = %channel.address(),
                        "Step executed"
                    );
                    if index == 0 {
                        self.manager.set_intermediate_result(id, result).await?;
                    }
                    value = result;
                }
                Err(e) => {
                    let reason = format!("{operation} on {} failed: {e}", channel.address());
                    return self.abort_all(id, created_clock, &reason).await;
                }
            }
        }

        if let Err(e) = self.manager.commit(id).await {
            self.compensate(id, &e.to_string()).await;
            let message = format!("Transaction aborted: {e}");
            return self.outcome(id, created_clock, None, message).await;
        }

        self.outcome(
            id,
            created_clock,
            Some(value),
            format!("Transaction committed with result {value}"),
        )
        .await
    }

    /// Poll one participant until it answers or the attempt budget is spent.
    /// Only transient failures are retried.
    async fn collect_vote(
        &self,
        id: TransactionId,
        operation: Operation,
        operand: i64,
        channel: &Arc<dyn RpcChannel>,
    ) -> (bool, String) {
        let attempts = self.config.prepare_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = PrepareRequest {
                coordinator_id: self.id.clone(),
                transaction_id: id,
                operation,
                operand,
                timestamp: self.clock.increment(),
            };

            match with_deadline(self.config.call_timeout, channel.prepare(request)).await {
                Ok(response) => return (response.ready, response.message),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let backoff = self.config.prepare_backoff * attempt;
                    tracing::warn!(
                        txn = id,
                        participant = %channel.address(),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Prepare failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    tracing::warn!(
                        txn = id,
                        participant = %channel.address(),
                        attempt,
                        error = %e,
                        "Prepare failed, recording no vote"
                    );
                    return (false, e.to_string());
                }
            }
        }
    }

    async fn execute_step(
        &self,
        id: TransactionId,
        channel: &Arc<dyn RpcChannel>,
        operand: i64,
    ) -> Result<i64, CadenceError> {
        let request = CommitRequest {
            coordinator_id: self.id.clone(),
            transaction_id: id,
            operand,
            timestamp: self.clock.increment(),
        };
        let response = with_deadline(self.config.call_timeout, channel.commit(request)).await?;
        self.clock.on_receive(response.timestamp);

        if response.success {
            Ok(response.result)
        } else {
            Err(CadenceError::LogicalFailure(response.message))
        }
    }

    async fn abort_all(
        &self,
        id: TransactionId,
        created_clock: u64,
        reason: &str,
    ) -> Result<TransactionOutcome, CadenceError> {
        self.manager.abort(id, reason).await?;
        self.compensate(id, reason).await;
        self.outcome(id, created_clock, None, format!("Transaction aborted: {reason}"))
            .await
    }

    /// Best-effort abort to every participant; failures are only logged
    async fn compensate(&self, id: TransactionId, reason: &str) {
        let calls = self.plan().map(|(_, channel)| {
            let request = AbortRequest {
                coordinator_id: self.id.clone(),
                transaction_id: id,
                reason: reason.to_string(),
            };
            self.clock.increment();
            async move {
                let result = with_deadline(self.config.call_timeout, channel.abort(request)).await;
                (channel.address(), result)
            }
        });

        for (participant, result) in join_all(calls).await {
            match result {
                Ok(response) if response.success => {
                    tracing::debug!(
                        txn = id,
                        participant = %participant,
                        "Compensating abort acknowledged"
                    );
                }
                Ok(response) => {
                    tracing::warn!(
                        txn = id,
                        participant = %participant,
                        message = %response.message,
                        "Compensating abort refused"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        txn = id,
                        participant = %participant,
                        error = %e,
                        "Compensating abort failed"
                    );
                }
            }
        }
    }

    async fn outcome(
        &self,
        id: TransactionId,
        created_clock: u64,
        result: Option<i64>,
        message: String,
    ) -> Result<TransactionOutcome, CadenceError> {
        let txn = self
            .manager
            .get(id)
            .await
            .ok_or(CadenceError::NotFound(id))?;

        Ok(TransactionOutcome {
            coordinator_id: self.id.clone(),
            transaction_id: id,
            state: txn.state,
            result,
            intermediate: txn.intermediate_result,
            created_clock,
            clock: self.clock.now(),
            message,
        })
    }
}

fn coordinator_id() -> String {
    use rand::Rng;
    format!("coord-{:016x}", rand::rng().random::<u64>())
}
