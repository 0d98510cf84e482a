//! Fire-and-forget clock reporting to the monitoring dashboard.

use cadence_common::ClockReport;
use cadence_common::constants::paths::DASHBOARD_CLOCK;
use std::collections::BTreeMap;
use std::time::Duration;

/// Pushes `(node_id, clock snapshot)` to a dashboard. Failures are logged, never returned.
#[derive(Clone)]
pub struct MonitorSink {
    endpoint: Option<String>,
    http: reqwest::Client,
}

impl MonitorSink {
    /// `base_url` of `None` disables reporting
    pub fn new(base_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();

        Self {
            endpoint: base_url.map(|b| format!("{}{}", b.trim_end_matches('/'), DASHBOARD_CLOCK)),
            http,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Spawn the push and return immediately
    pub fn report(&self, node_id: &str, clock: BTreeMap<String, u64>) {
        if !self.is_enabled() {
            return;
        }
        let sink = self.clone();
        let node_id = node_id.to_string();
        tokio::spawn(async move {
            sink.push(&node_id, clock).await;
        });
    }

    /// Push and wait for the dashboard's answer. For callers about to exit.
    pub async fn push(&self, node_id: &str, clock: BTreeMap<String, u64>) {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return;
        };

        let report = ClockReport {
            node_id: node_id.to_string(),
            clock,
        };

        let result = self
            .http
            .post(endpoint)
            .json(&report)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => tracing::trace!(node = %report.node_id, "Clock reported to dashboard"),
            Err(e) => tracing::warn!(
                node = %report.node_id,
                endpoint = %endpoint,
                error = %e,
                "Failed to report clock to dashboard"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_dashboard_is_swallowed() {
        let sink = MonitorSink::new(Some("http://127.0.0.1:9/".to_string()));
        assert!(sink.is_enabled());
        // Must not panic or block the caller
        sink.report("node-a", BTreeMap::from([("node-a".to_string(), 3)]));
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn test_awaited_push_swallows_failure() {
        let sink = MonitorSink::new(Some("http://127.0.0.1:9".to_string()));
        sink.push("client", BTreeMap::from([("client".to_string(), 1)])).await;
    }

    #[test]
    fn test_disabled_sink() {
        assert!(!MonitorSink::disabled().is_enabled());
    }
}
