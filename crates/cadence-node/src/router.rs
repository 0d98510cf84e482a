//! Client-facing router that hides leader location and failover.

use cadence_common::{
    CadenceError, CalculationRequest, CalculationResponse, Operation,
    constants::RPC_CALL_TIMEOUT_MS,
};
use std::sync::Arc;
use std::time::Duration;

use crate::leader::{LeaderDirectory, PointerStore};
use crate::rpc::{RpcChannel, with_deadline};

/// Sends calculations to the believed leader and rotates round-robin through its own
/// fixed server list on communication failure.
///
/// The router keeps a separate, independently persisted leader pointer. Redirect hints
/// in responses are returned to the caller and never followed here.
pub struct RequestRouter {
    servers: Vec<Arc<dyn RpcChannel>>,
    leader: LeaderDirectory,
    call_timeout: Duration,
}

impl RequestRouter {
    /// The first server is the default leader when `store` holds nothing usable
    pub async fn new(
        servers: Vec<Arc<dyn RpcChannel>>,
        store: Arc<dyn PointerStore>,
        call_timeout: Duration,
    ) -> Result<Self, CadenceError> {
        let default_leader = servers
            .first()
            .map(|s| s.address().to_string())
            .ok_or_else(|| CadenceError::Config("router needs at least one server".into()))?;

        // Rotation follows the server list, not a backup-port list
        let leader = LeaderDirectory::open(store, &default_leader, Vec::new()).await;

        Ok(Self {
            servers,
            leader,
            call_timeout,
        })
    }

    pub async fn with_default_timeout(
        servers: Vec<Arc<dyn RpcChannel>>,
        store: Arc<dyn PointerStore>,
    ) -> Result<Self, CadenceError> {
        Self::new(servers, store, Duration::from_millis(RPC_CALL_TIMEOUT_MS)).await
    }

    pub async fn current_leader(&self) -> String {
        self.leader.current_leader().await
    }

    pub fn servers(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|s| s.address())
    }

    /// Index of the believed leader in the server list; 0 when it is not listed
    async fn leader_index(&self) -> usize {
        for (index, server) in self.servers.iter().enumerate() {
            if self.leader.is_leader(server.address()).await {
                return index;
            }
        }
        0
    }

    /// Send one calculation, rotating on communication failure.
    ///
    /// Each failure counts against `max_retries`; once it is exceeded the call fails
    /// with [`CadenceError::AllServersUnavailable`]. Non-communication errors are
    /// returned immediately.
    pub async fn execute(
        &self,
        operand: i64,
        op: Operation,
        timestamp: u64,
        max_retries: u32,
    ) -> Result<CalculationResponse, CadenceError> {
        let mut index = self.leader_index().await;
        let mut failures = 0u32;

        loop {
            let server = &self.servers[index];
            let request = CalculationRequest { operand, timestamp };

            match with_deadline(self.call_timeout, server.calculate(op, request)).await {
                Ok(response) => {
                    tracing::debug!(
                        server = %server.address(),
                        op = %op,
                        success = response.success,
                        "Router call completed"
                    );
                    return Ok(response);
                }
                Err(e) if e.is_communication_failure() => {
                    failures += 1;
                    tracing::warn!(
                        server = %server.address(),
                        attempt = failures,
                        error = %e,
                        "Leader unreachable"
                    );

                    if failures > max_retries {
                        tracing::error!(attempts = failures, "All servers unavailable");
                        return Err(CadenceError::AllServersUnavailable);
                    }

                    index = (index + 1) % self.servers.len();
                    let next = self.servers[index].address();
                    let previous = self.leader.promote(next).await;
                    tracing::info!(previous = %previous, leader = %next, "Router switched leader");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leader::MemoryStore;
    use crate::rpc::LocalChannel;
    use crate::service::tests::{NODE_A, NODE_B, node};
    use async_trait::async_trait;
    use cadence_common::{
        AbortRequest, AbortResponse, ClockSyncRequest, ClockSyncResponse, CommitRequest,
        CommitResponse, PrepareRequest, PrepareResponse,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::assert_err;

    /// A server that never answers
    struct Down {
        address: String,
        calls: AtomicU32,
    }

    impl Down {
        fn new(address: &str) -> Self {
            Self {
                address: address.to_string(),
                calls: AtomicU32::new(0),
            }
        }

        fn unreachable(&self) -> CadenceError {
            CadenceError::Unavailable(format!("{} refused connection", self.address))
        }
    }

    #[async_trait]
    impl RpcChannel for Down {
        fn address(&self) -> &str {
            &self.address
        }

        async fn calculate(
            &self,
            _op: Operation,
            _request: CalculationRequest,
        ) -> Result<CalculationResponse, CadenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.unreachable())
        }

        async fn clock_sync(
            &self,
            _request: ClockSyncRequest,
        ) -> Result<ClockSyncResponse, CadenceError> {
            Err(self.unreachable())
        }

        async fn prepare(&self, _request: PrepareRequest) -> Result<PrepareResponse, CadenceError> {
            Err(self.unreachable())
        }

        async fn commit(&self, _request: CommitRequest) -> Result<CommitResponse, CadenceError> {
            Err(self.unreachable())
        }

        async fn abort(&self, _request: AbortRequest) -> Result<AbortResponse, CadenceError> {
            Err(self.unreachable())
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_with_all_unavailable() {
        let first = Arc::new(Down::new(NODE_A));
        let second = Arc::new(Down::new(NODE_B));
        let router = RequestRouter::with_default_timeout(
            vec![first.clone() as Arc<dyn RpcChannel>, second.clone()],
            Arc::new(MemoryStore::new()),
        )
        .await
        .unwrap();

        let err = assert_err!(router.execute(3, Operation::Square, 1, 2).await);

        assert_eq!(err, CadenceError::AllServersUnavailable);
        assert_eq!(err.to_string(), "All servers are unavailable");
        // 0 → 1 → 0
        assert_eq!(first.calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_rotates_to_next_server() {
        let down = Arc::new(Down::new(NODE_A));
        // B believes it is the leader
        let up = node(NODE_B, NODE_B, 0).await;
        let store = Arc::new(MemoryStore::new());
        let router = RequestRouter::with_default_timeout(
            vec![down.clone() as Arc<dyn RpcChannel>, Arc::new(LocalChannel::new(up))],
            store.clone(),
        )
        .await
        .unwrap();

        let response = router.execute(3, Operation::Cube, 1, 2).await.unwrap();

        assert!(response.success);
        assert_eq!(response.result, 27);
        assert_eq!(down.calls.load(Ordering::SeqCst), 1);
        assert_eq!(router.current_leader().await, NODE_B);
        assert_eq!(store.stored().await.as_deref(), Some(NODE_B));

        // The next call goes straight to B
        router.execute(2, Operation::Square, 2, 2).await.unwrap();
        assert_eq!(down.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_redirect_hint_is_returned_unchanged() {
        // B is up but believes A leads
        let b = node(NODE_B, NODE_A, 0).await;
        let router = RequestRouter::with_default_timeout(
            vec![Arc::new(LocalChannel::new(b)) as Arc<dyn RpcChannel>],
            Arc::new(MemoryStore::new()),
        )
        .await
        .unwrap();

        let response = router.execute(3, Operation::Square, 1, 2).await.unwrap();

        assert!(!response.success);
        assert_eq!(response.redirect_to.as_deref(), Some(NODE_A));
        assert_eq!(router.current_leader().await, NODE_B);
    }

    #[tokio::test]
    async fn test_persisted_pointer_outside_list_starts_at_first() {
        let a = node(NODE_A, NODE_A, 0).await;
        let store = Arc::new(MemoryStore::with_leader("http://localhost:5999"));
        let router = RequestRouter::with_default_timeout(
            vec![Arc::new(LocalChannel::new(a)) as Arc<dyn RpcChannel>],
            store,
        )
        .await
        .unwrap();

        let response = router.execute(5, Operation::Square, 0, 0).await.unwrap();
        assert_eq!(response.result, 25);
    }

    #[tokio::test]
    async fn test_empty_server_list_is_a_config_error() {
        let store = Arc::new(MemoryStore::new());
        let result = RequestRouter::with_default_timeout(Vec::new(), store).await;
        assert!(matches!(result, Err(CadenceError::Config(_))));
    }
}
