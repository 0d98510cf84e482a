//! Two-phase commit endpoints: participant RPCs and coordinator-driven transactions.

use axum::{
    Json,
    extract::{Path, State},
};
use cadence_common::{
    AbortRequest, AbortResponse, CadenceError, CommitRequest, CommitResponse, PrepareRequest,
    PrepareResponse,
};
use serde::Deserialize;

use super::ApiError;
use crate::state::AppState;
use crate::txn::{Transaction, TransactionId, TransactionOutcome};

pub async fn prepare(
    State(state): State<AppState>,
    Json(request): Json<PrepareRequest>,
) -> Json<PrepareResponse> {
    Json(state.service.prepare(request).await)
}

pub async fn commit(
    State(state): State<AppState>,
    Json(request): Json<CommitRequest>,
) -> Json<CommitResponse> {
    Json(state.service.commit(request).await)
}

pub async fn abort(
    State(state): State<AppState>,
    Json(request): Json<AbortRequest>,
) -> Json<AbortResponse> {
    Json(state.service.abort(request).await)
}

#[derive(Deserialize)]
pub struct RunTransaction {
    operand: i64,
}

/// Run `square → cube` across the first two configured servers
pub async fn run_transaction(
    State(state): State<AppState>,
    Json(payload): Json<RunTransaction>,
) -> Result<Json<TransactionOutcome>, ApiError> {
    let coordinator = state.coordinator.as_ref().ok_or_else(|| {
        CadenceError::Config("two servers are required to coordinate a transaction".into())
    })?;

    Ok(Json(coordinator.run(payload.operand).await?))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<TransactionId>,
) -> Result<Json<Transaction>, ApiError> {
    state
        .transactions
        .get(id)
        .await
        .map(Json)
        .ok_or(ApiError::from(CadenceError::NotFound(id)))
}
