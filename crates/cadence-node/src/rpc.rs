//! Node-to-node RPC: one trait, an HTTP transport and an in-process one.

use async_trait::async_trait;
use cadence_common::{
    AbortRequest, AbortResponse, CadenceError, CalculationRequest, CalculationResponse,
    ClockSyncRequest, ClockSyncResponse, CommitRequest, CommitResponse, Operation,
    PrepareRequest, PrepareResponse, constants::paths,
};
use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::service::NodeService;

/// Client side of the RPC surface every node serves
#[async_trait]
pub trait RpcChannel: Send + Sync {
    /// Address of the remote node, as used by the leader pointer
    fn address(&self) -> &str;

    async fn calculate(
        &self,
        op: Operation,
        request: CalculationRequest,
    ) -> Result<CalculationResponse, CadenceError>;

    async fn clock_sync(
        &self,
        request: ClockSyncRequest,
    ) -> Result<ClockSyncResponse, CadenceError>;

    async fn prepare(&self, request: PrepareRequest) -> Result<PrepareResponse, CadenceError>;

    async fn commit(&self, request: CommitRequest) -> Result<CommitResponse, CadenceError>;

    async fn abort(&self, request: AbortRequest) -> Result<AbortResponse, CadenceError>;
}

/// JSON over HTTP to a remote node's axum router
pub struct HttpChannel {
    base_url: String,
    http: reqwest::Client,
}

impl HttpChannel {
    pub fn new(base_url: impl Into<String>, call_timeout: Duration) -> Result<Self, CadenceError> {
        let http = reqwest::Client::builder()
            .timeout(call_timeout)
            .connect_timeout(call_timeout)
            .build()
            .map_err(|e| CadenceError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, CadenceError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| classify(&url, e))?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(CadenceError::Unavailable(format!("{url} returned {status}")));
        }
        if !status.is_success() {
            return Err(CadenceError::Communication(format!("{url} returned {status}")));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| CadenceError::Communication(format!("{url}: malformed reply: {e}")))
    }
}

fn classify(url: &str, e: reqwest::Error) -> CadenceError {
    if e.is_timeout() {
        CadenceError::Timeout(format!("{url}: {e}"))
    } else if e.is_connect() {
        CadenceError::Unavailable(format!("{url}: {e}"))
    } else {
        CadenceError::Communication(format!("{url}: {e}"))
    }
}

fn operation_path(op: Operation) -> &'static str {
    match op {
        Operation::Square => paths::SQUARE,
        Operation::Cube => paths::CUBE,
    }
}

#[async_trait]
impl RpcChannel for HttpChannel {
    fn address(&self) -> &str {
        &self.base_url
    }

    async fn calculate(
        &self,
        op: Operation,
        request: CalculationRequest,
    ) -> Result<CalculationResponse, CadenceError> {
        self.post(operation_path(op), &request).await
    }

    async fn clock_sync(
        &self,
        request: ClockSyncRequest,
    ) -> Result<ClockSyncResponse, CadenceError> {
        self.post(paths::CLOCK_SYNC, &request).await
    }

    async fn prepare(&self, request: PrepareRequest) -> Result<PrepareResponse, CadenceError> {
        self.post(paths::PREPARE, &request).await
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitResponse, CadenceError> {
        self.post(paths::COMMIT, &request).await
    }

    async fn abort(&self, request: AbortRequest) -> Result<AbortResponse, CadenceError> {
        self.post(paths::ABORT, &request).await
    }
}

/// Direct calls into a [`NodeService`] in the same process
pub struct LocalChannel {
    service: Arc<NodeService>,
}

impl LocalChannel {
    pub fn new(service: Arc<NodeService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RpcChannel for LocalChannel {
    fn address(&self) -> &str {
        self.service.address()
    }

    async fn calculate(
        &self,
        op: Operation,
        request: CalculationRequest,
    ) -> Result<CalculationResponse, CadenceError> {
        Ok(self.service.calculate(op, request).await)
    }

    async fn clock_sync(
        &self,
        request: ClockSyncRequest,
    ) -> Result<ClockSyncResponse, CadenceError> {
        Ok(self.service.clock_sync(request).await)
    }

    async fn prepare(&self, request: PrepareRequest) -> Result<PrepareResponse, CadenceError> {
        Ok(self.service.prepare(request).await)
    }

    async fn commit(&self, request: CommitRequest) -> Result<CommitResponse, CadenceError> {
        Ok(self.service.commit(request).await)
    }

    async fn abort(&self, request: AbortRequest) -> Result<AbortResponse, CadenceError> {
        Ok(self.service.abort(request).await)
    }
}

/// Bound one call by `limit`; an elapsed deadline is a [`CadenceError::Timeout`]
pub async fn with_deadline<T, F>(limit: Duration, call: F) -> Result<T, CadenceError>
where
    F: Future<Output = Result<T, CadenceError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CadenceError::Timeout(format!(
            "no reply within {}ms",
            limit.as_millis()
        ))),
    }
}

/// Build one HTTP channel per address
pub fn http_channels(
    addresses: &[String],
    call_timeout: Duration,
) -> Result<Vec<Arc<dyn RpcChannel>>, CadenceError> {
    addresses
        .iter()
        .map(|addr| {
            HttpChannel::new(addr.clone(), call_timeout).map(|c| Arc::new(c) as Arc<dyn RpcChannel>)
        })
        .collect()
}
