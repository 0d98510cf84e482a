//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    node_id: String,
}

/// Basic health check (is the server running?)
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        node_id: state.service.node_id().to_string(),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    leader: String,
    store: String,
}

/// Readiness check: the leader pointer store must be readable
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    let directory = state.service.leader();

    match directory.check_store().await {
        Ok(()) => Ok(Json(ReadyResponse {
            status: "ready",
            leader: directory.current_leader().await,
            store: directory.store_description(),
        })),
        Err(e) => {
            tracing::warn!(
                error = %e,
                store = %directory.store_description(),
                "Leader store not readable"
            );
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
