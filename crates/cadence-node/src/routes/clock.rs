//! Clock exchange and diagnostics endpoints.

use axum::{Json, extract::State};
use cadence_common::{ClockSyncRequest, ClockSyncResponse};

use crate::service::ClockDiagnostics;
use crate::state::AppState;

pub async fn clock_sync(
    State(state): State<AppState>,
    Json(request): Json<ClockSyncRequest>,
) -> Json<ClockSyncResponse> {
    Json(state.service.clock_sync(request).await)
}

/// Scalar time, matrix view and per-peer staleness
pub async fn diagnostics(State(state): State<AppState>) -> Json<ClockDiagnostics> {
    Json(state.service.diagnostics().await)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{app, parse, send};
    use cadence_common::ClockSyncResponse;
    use serde_json::json;

    #[tokio::test]
    async fn test_clock_sync_and_diagnostics() {
        let (app, _) = app().await;

        let request = json!({ "current_clock": 9 });
        let (_, body) = send(&app, "POST", "/clock/sync", Some(request)).await;
        let response: ClockSyncResponse = parse(body);
        assert_eq!(response.synced_clock, 0);
        assert!(response.diverged);

        let (_, body) = send(&app, "GET", "/clock", None).await;
        assert_eq!(body["scalar"], 0);
        assert!(body["matrix"]["http://localhost:5001"].is_object());
        assert!(body["staleness"]["http://localhost:5002"].is_u64());
    }
}
