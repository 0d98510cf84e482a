//! RPC shapes and persisted records shared across Cadence components.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calc::Operation;

/// Request for a single calculation (`Square` / `Cube`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub operand: i64,
    /// Caller's Lamport time at send
    pub timestamp: u64,
}

/// Calculation outcome. Failures are reported in-band, never as transport faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResponse {
    pub result: i64,
    /// Responder's Lamport time after handling
    pub timestamp: u64,
    pub success: bool,
    pub message: String,
    /// Address the caller should talk to instead (set on redirect or self-demotion)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

impl CalculationResponse {
    pub fn ok(result: i64, timestamp: u64, message: impl Into<String>) -> Self {
        Self {
            result,
            timestamp,
            success: true,
            message: message.into(),
            redirect_to: None,
        }
    }

    pub fn failed(timestamp: u64, message: impl Into<String>) -> Self {
        Self {
            result: 0,
            timestamp,
            success: false,
            message: message.into(),
            redirect_to: None,
        }
    }

    pub fn redirect(timestamp: u64, message: impl Into<String>, leader: String) -> Self {
        Self {
            redirect_to: Some(leader),
            ..Self::failed(timestamp, message)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSyncRequest {
    pub current_clock: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSyncResponse {
    pub synced_clock: u64,
    pub diverged: bool,
    pub message: String,
}

/// Phase-one vote request sent by the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRequest {
    /// Issuing coordinator; transaction ids are only unique within one coordinator
    pub coordinator_id: String,
    pub transaction_id: u64,
    /// Operation this participant will be asked to run
    pub operation: Operation,
    /// Operand the transaction was opened with
    pub operand: i64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareResponse {
    pub ready: bool,
    pub participant_id: String,
    pub message: String,
}

/// Phase-two execution request; `operand` is the value this participant must operate on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRequest {
    pub coordinator_id: String,
    pub transaction_id: u64,
    pub operand: i64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResponse {
    pub success: bool,
    pub message: String,
    pub result: i64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortRequest {
    pub coordinator_id: String,
    pub transaction_id: u64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortResponse {
    pub success: bool,
    pub message: String,
}

/// Payload pushed to the monitoring dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockReport {
    pub node_id: String,
    pub clock: BTreeMap<String, u64>,
}

/// Durable leader pointer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderRecord {
    pub leader: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_hint_omitted_when_absent() {
        let ok = CalculationResponse::ok(16, 3, "square successful");
        let json = serde_json::to_string(&ok).unwrap();
        assert!(!json.contains("redirect_to"));

        let parsed: CalculationResponse =
            serde_json::from_str(r#"{"result":0,"timestamp":1,"success":false,"message":"x"}"#)
                .unwrap();
        assert_eq!(parsed.redirect_to, None);
    }

    #[test]
    fn test_leader_record_shape() {
        let record: LeaderRecord =
            serde_json::from_str(r#"{"leader":"http://127.0.0.1:5002"}"#).unwrap();
        assert_eq!(record.leader, "http://127.0.0.1:5002");
    }
}
