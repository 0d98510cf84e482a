//! Transport-agnostic RPC handlers for one node.
//!
//! Every handler returns a typed response carrying a message; failures are reported
//! in-band and never escape as faults.

use cadence_common::{
    AbortRequest, AbortResponse, CalculationRequest, CalculationResponse, ClockSyncRequest,
    ClockSyncResponse, CommitRequest, CommitResponse, MatrixClock, Operation, PrepareRequest,
    PrepareResponse, ScalarClock, calculate,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::fault::FaultInjector;
use crate::leader::LeaderDirectory;
use crate::monitor::MonitorSink;
use crate::txn::ParticipantLedger;

/// Clock diagnostics served on `GET /clock`
#[derive(Debug, Clone, Serialize)]
pub struct ClockDiagnostics {
    pub node_id: String,
    pub scalar: u64,
    pub matrix: BTreeMap<String, BTreeMap<String, u64>>,
    pub staleness: BTreeMap<String, u64>,
}

pub struct NodeService {
    node_id: String,
    /// Address this node is known by; also its participant id
    address: String,
    clock: Arc<ScalarClock>,
    matrix: RwLock<MatrixClock>,
    leader: Arc<LeaderDirectory>,
    ledger: Arc<ParticipantLedger>,
    faults: Arc<dyn FaultInjector>,
    monitor: MonitorSink,
    divergence_threshold: u64,
}

impl NodeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        node_id: String,
        address: String,
        peers: &[String],
        clock: Arc<ScalarClock>,
        leader: Arc<LeaderDirectory>,
        faults: Arc<dyn FaultInjector>,
        monitor: MonitorSink,
        divergence_threshold: u64,
    ) -> Self {
        let matrix = MatrixClock::new(address.clone(), peers.iter().cloned());
        Self {
            node_id,
            address,
            clock,
            matrix: RwLock::new(matrix),
            leader,
            ledger: Arc::new(ParticipantLedger::new()),
            faults,
            monitor,
            divergence_threshold,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn clock(&self) -> &Arc<ScalarClock> {
        &self.clock
    }

    pub fn leader(&self) -> &Arc<LeaderDirectory> {
        &self.leader
    }

    pub fn ledger(&self) -> &Arc<ParticipantLedger> {
        &self.ledger
    }

    /// `Square` / `Cube` RPC
    pub async fn calculate(
        &self,
        op: Operation,
        request: CalculationRequest,
    ) -> CalculationResponse {
        if !self.leader.is_leader(&self.address).await {
            let leader = self.leader.current_leader().await;
            tracing::debug!(op = %op, leader = %leader, "Rejecting request, not the leader");
            return CalculationResponse::redirect(
                self.clock.now(),
                format!("Not the leader. Current leader is: {leader}"),
                leader,
            );
        }

        let received = self.clock.on_receive(request.timestamp);
        tracing::debug!(
            op = %op,
            operand = request.operand,
            remote = request.timestamp,
            clock = received,
            "Calculation received"
        );

        let delay = self.faults.processing_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.faults.leader_failure() {
            return self.self_demote(op).await;
        }

        match calculate(op, request.operand) {
            Ok(result) => {
                let timestamp = self.clock.increment();
                self.observe_local(timestamp).await;
                tracing::info!(
                    op = %op,
                    operand = request.operand,
                    result,
                    clock = timestamp,
                    "Calculation served"
                );
                let message = format!("{op} successful (processed by leader)");
                CalculationResponse::ok(result, timestamp, message)
            }
            Err(e) => {
                tracing::warn!(
                    op = %op,
                    operand = request.operand,
                    error = %e,
                    "Calculation rejected"
                );
                CalculationResponse::failed(self.clock.now(), e.to_string())
            }
        }
    }

    /// Simulated leader failure: promote the next backup and hand the caller a redirect hint
    async fn self_demote(&self, op: Operation) -> CalculationResponse {
        let now = self.clock.now();
        match self.leader.next_backup().await {
            Some(next) => {
                let previous = self.leader.promote(&next).await;
                tracing::error!(
                    op = %op,
                    previous = %previous,
                    leader = %next,
                    "Leader failure, self-demoted"
                );
                let message = format!("Leader failed. New leader is: {next}");
                CalculationResponse::redirect(now, message, next)
            }
            None => {
                tracing::error!(op = %op, "Leader failure with no backup configured");
                CalculationResponse::failed(now, "Leader failed and no backup is configured")
            }
        }
    }

    /// `ClockSync` RPC. Read-only for the responder: the caller pulls our time and merges it.
    pub async fn clock_sync(&self, request: ClockSyncRequest) -> ClockSyncResponse {
        let local = self.clock.now();
        let divergence = local.abs_diff(request.current_clock);
        let diverged = divergence > self.divergence_threshold;

        if diverged {
            tracing::warn!(
                local,
                remote = request.current_clock,
                divergence,
                "Diverged: clocks out of sync"
            );
        }

        ClockSyncResponse {
            synced_clock: local,
            diverged,
            message: if diverged { "Diverged" } else { "Synchronized" }.to_string(),
        }
    }

    /// 2PC phase one, participant side
    pub async fn prepare(&self, request: PrepareRequest) -> PrepareResponse {
        self.clock.on_receive(request.timestamp);
        let id = request.transaction_id;
        let coordinator = request.coordinator_id.as_str();

        if self.faults.refuse_prepare() {
            tracing::warn!(txn = id, coordinator, "Refusing prepare (injected fault)");
            let message = "Cannot perform operation: participant unavailable".to_string();
            return self.vote(false, message);
        }

        match self
            .ledger
            .prepare(coordinator, id, request.operation, request.operand)
            .await
        {
            Ok(()) => {
                tracing::info!(
                    txn = id,
                    coordinator,
                    op = %request.operation,
                    operand = request.operand,
                    "Prepared"
                );
                self.vote(true, "Ready to proceed".to_string())
            }
            Err(e) => {
                tracing::warn!(txn = id, coordinator, error = %e, "Voting no");
                self.vote(false, format!("Cannot perform operation: {e}"))
            }
        }
    }

    fn vote(&self, ready: bool, message: String) -> PrepareResponse {
        PrepareResponse {
            ready,
            participant_id: self.address.clone(),
            message,
        }
    }

    /// 2PC phase two, participant side: execute the staged operation
    pub async fn commit(&self, request: CommitRequest) -> CommitResponse {
        self.clock.on_receive(request.timestamp);
        let id = request.transaction_id;
        let coordinator = request.coordinator_id.as_str();

        match self.ledger.commit(coordinator, id, request.operand).await {
            Ok(result) => {
                let timestamp = self.clock.increment();
                self.observe_local(timestamp).await;
                tracing::info!(
                    txn = id,
                    coordinator,
                    operand = request.operand,
                    result,
                    clock = timestamp,
                    "Committed"
                );
                CommitResponse {
                    success: true,
                    message: "Operation committed successfully".to_string(),
                    result,
                    timestamp,
                }
            }
            Err(e) => {
                tracing::warn!(txn = id, coordinator, error = %e, "Commit failed");
                CommitResponse {
                    success: false,
                    message: format!("Commit failed: {e}"),
                    result: 0,
                    timestamp: self.clock.now(),
                }
            }
        }
    }

    /// 2PC abort, participant side
    pub async fn abort(&self, request: AbortRequest) -> AbortResponse {
        let id = request.transaction_id;
        let coordinator = request.coordinator_id.as_str();
        match self.ledger.abort(coordinator, id).await {
            Ok(()) => {
                tracing::info!(txn = id, coordinator, reason = %request.reason, "Aborted");
                AbortResponse {
                    success: true,
                    message: "Transaction aborted successfully".to_string(),
                }
            }
            Err(e) => AbortResponse {
                success: false,
                message: format!("Error during abort: {e}"),
            },
        }
    }

    /// Fold a gossip result into the matrix clock
    pub async fn record_peer_clock(&self, peer: &str, value: u64) {
        let mut matrix = self.matrix.write().await;
        matrix.record_peer(peer, value);
        matrix.observe_local(self.clock.now());
    }

    pub async fn diagnostics(&self) -> ClockDiagnostics {
        let mut matrix = self.matrix.write().await;
        matrix.observe_local(self.clock.now());
        ClockDiagnostics {
            node_id: self.node_id.clone(),
            scalar: self.clock.now(),
            matrix: matrix.rows(),
            staleness: matrix.staleness_report(),
        }
    }

    /// Push this node's own vector (matrix self row) to the monitoring sink
    pub async fn report_clock(&self) {
        if !self.monitor.is_enabled() {
            return;
        }
        let row = self.matrix.read().await.own_row();
        self.monitor.report(&self.node_id, row);
    }

    async fn observe_local(&self, timestamp: u64) {
        self.matrix.write().await.observe_local(timestamp);
        self.report_clock().await;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fault::NoFaults;
    use crate::leader::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    pub const NODE_A: &str = "http://localhost:5001";
    pub const NODE_B: &str = "http://localhost:5002";

    /// Scripted faults: fail the leader once when armed
    #[derive(Default)]
    pub struct ArmedFailure(pub AtomicBool);

    impl FaultInjector for ArmedFailure {
        fn leader_failure(&self) -> bool {
            self.0.swap(false, Ordering::SeqCst)
        }
        fn processing_delay(&self) -> Duration {
            Duration::ZERO
        }
        fn refuse_prepare(&self) -> bool {
            false
        }
    }

    pub async fn node_with(
        address: &str,
        leader: &str,
        clock_start: u64,
        faults: Arc<dyn FaultInjector>,
    ) -> Arc<NodeService> {
        let store = Arc::new(MemoryStore::with_leader(leader));
        let directory = LeaderDirectory::open(store, leader, vec![5002, 5003]).await;
        Arc::new(NodeService::new(
            format!("node-{}", crate::leader::port_of(address).unwrap_or(0)),
            address.to_string(),
            &[NODE_A.to_string(), NODE_B.to_string()],
            Arc::new(ScalarClock::with_start(clock_start)),
            Arc::new(directory),
            faults,
            MonitorSink::disabled(),
            5,
        ))
    }

    pub async fn node(address: &str, leader: &str, clock_start: u64) -> Arc<NodeService> {
        node_with(address, leader, clock_start, Arc::new(NoFaults)).await
    }

    #[tokio::test]
    async fn test_leader_serves_and_advances_clock() {
        let svc = node(NODE_A, NODE_A, 0).await;
        let resp = svc
            .calculate(Operation::Square, CalculationRequest { operand: 4, timestamp: 7 })
            .await;

        assert!(resp.success);
        assert_eq!(resp.result, 16);
        // on_receive(7) -> 8, then increment before replying -> 9
        assert_eq!(resp.timestamp, 9);
        assert_eq!(resp.redirect_to, None);
    }

    #[tokio::test]
    async fn test_non_leader_redirects_without_ticking() {
        let svc = node(NODE_B, NODE_A, 3).await;
        let resp = svc
            .calculate(Operation::Cube, CalculationRequest { operand: 2, timestamp: 50 })
            .await;

        assert!(!resp.success);
        assert_eq!(resp.redirect_to.as_deref(), Some(NODE_A));
        assert_eq!(resp.timestamp, 3);
        assert_eq!(svc.clock().now(), 3);
    }

    #[tokio::test]
    async fn test_negative_operand_is_rejected_without_failover() {
        let svc = node(NODE_A, NODE_A, 0).await;
        let resp = svc
            .calculate(Operation::Square, CalculationRequest { operand: -3, timestamp: 0 })
            .await;

        assert!(!resp.success);
        assert!(resp.message.contains("negative"));
        assert_eq!(resp.redirect_to, None);
        assert!(svc.leader().is_leader(NODE_A).await);
    }

    #[tokio::test]
    async fn test_simulated_failure_promotes_next_backup() {
        let faults = Arc::new(ArmedFailure(AtomicBool::new(true)));
        let svc = node_with(NODE_A, NODE_A, 0, faults).await;

        let resp = svc
            .calculate(Operation::Square, CalculationRequest { operand: 2, timestamp: 1 })
            .await;

        assert!(!resp.success);
        assert_eq!(resp.redirect_to.as_deref(), Some(NODE_B));
        assert_eq!(svc.leader().current_leader().await, NODE_B);

        // Now a backup in its own view: subsequent requests are redirected
        let again = svc
            .calculate(Operation::Square, CalculationRequest { operand: 2, timestamp: 1 })
            .await;
        assert_eq!(again.redirect_to.as_deref(), Some(NODE_B));
    }

    #[tokio::test]
    async fn test_clock_sync_reports_divergence_without_ticking() {
        let svc = node(NODE_A, NODE_A, 10).await;

        let close = svc.clock_sync(ClockSyncRequest { current_clock: 8 }).await;
        assert!(!close.diverged);
        assert_eq!(close.synced_clock, 10);

        let far = svc.clock_sync(ClockSyncRequest { current_clock: 2 }).await;
        assert!(far.diverged);
        assert_eq!(far.message, "Diverged");
        assert_eq!(svc.clock().now(), 10);
    }

    #[tokio::test]
    async fn test_participant_prepare_commit_abort() {
        let svc = node(NODE_B, NODE_A, 0).await;

        let vote = svc
            .prepare(PrepareRequest {
                coordinator_id: "coord-a".to_string(),
                transaction_id: 1,
                operation: Operation::Cube,
                operand: 4,
                timestamp: 2,
            })
            .await;
        assert!(vote.ready);
        assert_eq!(vote.participant_id, NODE_B);

        let commit = svc
            .commit(CommitRequest {
                coordinator_id: "coord-a".to_string(),
                transaction_id: 1,
                operand: 16,
                timestamp: 5,
            })
            .await;
        assert!(commit.success);
        assert_eq!(commit.result, 4096);
        assert!(commit.timestamp > 5);

        let abort = svc
            .abort(AbortRequest {
                coordinator_id: "coord-a".to_string(),
                transaction_id: 1,
                reason: "late".to_string(),
            })
            .await;
        assert!(!abort.success);

        // Same id under another coordinator is a separate transaction
        let other = svc
            .abort(AbortRequest {
                coordinator_id: "coord-b".to_string(),
                transaction_id: 1,
                reason: "operator".to_string(),
            })
            .await;
        assert!(other.success);

        let no = svc
            .prepare(PrepareRequest {
                coordinator_id: "coord-a".to_string(),
                transaction_id: 2,
                operation: Operation::Square,
                operand: -1,
                timestamp: 0,
            })
            .await;
        assert!(!no.ready);
    }

    #[tokio::test]
    async fn test_diagnostics_mirror_scalar_on_diagonal() {
        let svc = node(NODE_A, NODE_A, 0).await;
        svc.calculate(Operation::Square, CalculationRequest { operand: 1, timestamp: 4 })
            .await;
        svc.record_peer_clock(NODE_B, 3).await;

        let diag = svc.diagnostics().await;
        assert_eq!(diag.scalar, 6);
        assert_eq!(diag.matrix[NODE_A][NODE_A], 6);
        assert_eq!(diag.matrix[NODE_A][NODE_B], 3);
        assert_eq!(diag.staleness[NODE_B], 6);
    }
}
