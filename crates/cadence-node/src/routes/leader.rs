//! Leader pointer inspection and explicit failover.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Serialize)]
pub struct LeaderResponse {
    leader: String,
    is_self: bool,
    next_backup: Option<String>,
    backup_ports: Vec<u16>,
    store: String,
}

pub async fn get_leader(State(state): State<AppState>) -> Json<LeaderResponse> {
    let directory = state.service.leader();
    let leader = directory.current_leader().await;

    Json(LeaderResponse {
        is_self: directory.is_leader(state.service.address()).await,
        leader,
        next_backup: directory.next_backup().await,
        backup_ports: directory.backup_ports().to_vec(),
        store: directory.store_description(),
    })
}

#[derive(Deserialize)]
pub struct SetLeader {
    /// Omit to fail over to the next backup
    leader: Option<String>,
}

#[derive(Serialize)]
pub struct FailoverResponse {
    previous: String,
    leader: String,
    changed: bool,
}

/// Explicit failover: promote the named address, or the next backup
pub async fn set_leader(
    State(state): State<AppState>,
    Json(payload): Json<SetLeader>,
) -> Json<FailoverResponse> {
    let directory = state.service.leader();

    let target = match payload.leader {
        Some(leader) => Some(leader),
        None => directory.next_backup().await,
    };

    match target {
        Some(leader) => {
            let previous = directory.promote(&leader).await;
            tracing::info!(previous = %previous, leader = %leader, "Explicit failover");
            Json(FailoverResponse {
                previous,
                leader,
                changed: true,
            })
        }
        None => {
            let leader = directory.current_leader().await;
            tracing::warn!(leader = %leader, "Failover requested but no backup is configured");
            Json(FailoverResponse {
                previous: leader.clone(),
                leader,
                changed: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{app, send};
    use serde_json::json;

    #[tokio::test]
    async fn test_inspect_and_fail_over() {
        let (app, state) = app().await;

        let (_, body) = send(&app, "GET", "/leader", None).await;
        assert_eq!(body["leader"], "http://localhost:5001");
        assert_eq!(body["is_self"], true);
        assert_eq!(body["next_backup"], "http://localhost:5002");

        let (_, body) = send(&app, "POST", "/leader", Some(json!({}))).await;
        assert_eq!(body["previous"], "http://localhost:5001");
        assert_eq!(body["leader"], "http://localhost:5002");
        assert!(!state.service.leader().is_leader("http://localhost:5001").await);

        // No longer the leader: calculations are redirected
        let (_, body) =
            send(&app, "POST", "/square", Some(json!({ "operand": 2, "timestamp": 0 }))).await;
        assert_eq!(body["redirect_to"], "http://localhost:5002");

        let (_, body) = send(
            &app,
            "POST",
            "/leader",
            Some(json!({ "leader": "http://localhost:5001" })),
        )
        .await;
        assert_eq!(body["leader"], "http://localhost:5001");
    }
}
