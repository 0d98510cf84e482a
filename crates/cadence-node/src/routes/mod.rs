//! HTTP route handlers for a Cadence node.

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use cadence_common::{CadenceError, constants::paths};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::state::AppState;

mod calc;
mod clock;
mod health;
mod leader;
mod txn;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let request_timeout = state.config.request_timeout();

    Router::new()
        // Health & Status
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))

        // Calculation RPCs
        .route(paths::SQUARE, post(calc::square))
        .route(paths::CUBE, post(calc::cube))

        // Clocks
        .route(paths::CLOCK_SYNC, post(clock::clock_sync))
        .route("/clock", get(clock::diagnostics))

        // Participant side of 2PC
        .route(paths::PREPARE, post(txn::prepare))
        .route(paths::COMMIT, post(txn::commit))
        .route(paths::ABORT, post(txn::abort))

        // Coordinator side of 2PC
        .route("/transactions", post(txn::run_transaction))
        .route("/transactions/{id}", get(txn::get_transaction))

        // Leader pointer (explicit failover)
        .route("/leader", get(leader::get_leader).post(leader::set_leader))

        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// JSON error reply carrying the error's HTTP status
pub struct ApiError(CadenceError);

impl From<CadenceError> for ApiError {
    fn from(e: CadenceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::fault::FaultInjector;
    use crate::rpc::{LocalChannel, RpcChannel};
    use crate::service::tests::{NODE_A, NODE_B, node, node_with};
    use axum::body::Body;
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Slow(Duration);

    impl FaultInjector for Slow {
        fn leader_failure(&self) -> bool {
            false
        }
        fn processing_delay(&self) -> Duration {
            self.0
        }
        fn refuse_prepare(&self) -> bool {
            false
        }
    }

    /// Router for node A (the leader) with node B as the second participant
    pub async fn app() -> (Router, AppState) {
        let a = node(NODE_A, NODE_A, 0).await;
        let b = node(NODE_B, NODE_A, 0).await;
        let channels: Vec<Arc<dyn RpcChannel>> = vec![
            Arc::new(LocalChannel::new(a.clone())),
            Arc::new(LocalChannel::new(b)),
        ];
        let state = AppState::from_parts(AppConfig::default(), a, channels);
        (create_router(state.clone()), state)
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        // Extractor rejections reply in plain text
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    pub fn parse<T: DeserializeOwned>(value: serde_json::Value) -> T {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_slow_handler_times_out() {
        let slow = node_with(NODE_A, NODE_A, 0, Arc::new(Slow(Duration::from_secs(3)))).await;
        let config = AppConfig {
            request_timeout_secs: 1,
            ..AppConfig::default()
        };
        let channels: Vec<Arc<dyn RpcChannel>> = vec![Arc::new(LocalChannel::new(slow.clone()))];
        let app = create_router(AppState::from_parts(config, slow, channels));

        let body = serde_json::json!({ "operand": 2, "timestamp": 0 });
        let (status, _) = send(&app, "POST", paths::SQUARE, Some(body)).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);

        let (status, _) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn test_api_error_status() {
        let response = ApiError(CadenceError::NotFound(9)).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::from(CadenceError::AllServersUnavailable).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
