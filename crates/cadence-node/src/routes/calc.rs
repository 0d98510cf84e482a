//! Square and cube RPC endpoints.

use axum::{Json, extract::State};
use cadence_common::{CalculationRequest, CalculationResponse, Operation};

use crate::state::AppState;

pub async fn square(
    State(state): State<AppState>,
    Json(request): Json<CalculationRequest>,
) -> Json<CalculationResponse> {
    Json(state.service.calculate(Operation::Square, request).await)
}

pub async fn cube(
    State(state): State<AppState>,
    Json(request): Json<CalculationRequest>,
) -> Json<CalculationResponse> {
    Json(state.service.calculate(Operation::Cube, request).await)
}

#[cfg(test)]
mod tests {
    use super::super::tests::{app, parse, send};
    use axum::http::StatusCode;
    use cadence_common::CalculationResponse;
    use serde_json::json;

    #[tokio::test]
    async fn test_square_and_cube_over_http() {
        let (app, state) = app().await;

        let (status, body) =
            send(&app, "POST", "/square", Some(json!({ "operand": 5, "timestamp": 10 }))).await;
        assert_eq!(status, StatusCode::OK);
        let response: CalculationResponse = parse(body);
        assert!(response.success);
        assert_eq!(response.result, 25);
        assert_eq!(response.timestamp, 12);

        let (_, body) =
            send(&app, "POST", "/cube", Some(json!({ "operand": 2, "timestamp": 0 }))).await;
        let response: CalculationResponse = parse(body);
        assert_eq!(response.result, 8);
        assert_eq!(state.service.clock().now(), response.timestamp);
    }

    #[tokio::test]
    async fn test_negative_operand_is_an_in_band_failure() {
        let (app, _) = app().await;

        let (status, body) =
            send(&app, "POST", "/square", Some(json!({ "operand": -1, "timestamp": 0 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(body.get("redirect_to").is_none());
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        let (app, _) = app().await;
        let (status, body) = send(&app, "POST", "/square", Some(json!({ "value": 5 }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.as_str().unwrap().contains("operand"), "{body}");
    }
}
