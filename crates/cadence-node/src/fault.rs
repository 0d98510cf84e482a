//! Fault injection for demonstrations.
//!
//! Production nodes run with [`NoFaults`]. [`RandomFaults`] reproduces the lossy
//! demo cluster; tests plug in their own deterministic implementations.

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// Injectable failure source consulted by the node service
pub trait FaultInjector: Send + Sync {
    /// Should the leader act as if it just failed while serving this request?
    fn leader_failure(&self) -> bool;

    /// Artificial processing delay for this request
    fn processing_delay(&self) -> Duration;

    /// Should this participant refuse a prepare request?
    fn refuse_prepare(&self) -> bool;
}

/// Never injects anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn leader_failure(&self) -> bool {
        false
    }

    fn processing_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn refuse_prepare(&self) -> bool {
        false
    }
}

/// Fault injection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FaultConfig {
    /// Enable random fault injection
    #[serde(default)]
    pub enabled: bool,

    /// Probability that the leader demotes itself while serving a calculation
    #[serde(default = "default_leader_failure")]
    pub leader_failure_probability: f64,

    /// Probability that a participant votes no during prepare
    #[serde(default)]
    pub prepare_refusal_probability: f64,

    /// Processing delay range in milliseconds (inclusive)
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            leader_failure_probability: default_leader_failure(),
            prepare_refusal_probability: 0.0,
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_leader_failure() -> f64 { 0.25 }
fn default_min_delay() -> u64 { 2_000 }
fn default_max_delay() -> u64 { 5_000 }

/// Random faults driven by [`FaultConfig`]
#[derive(Debug, Clone)]
pub struct RandomFaults {
    config: FaultConfig,
}

impl RandomFaults {
    pub fn new(config: FaultConfig) -> Self {
        Self { config }
    }
}

impl FaultInjector for RandomFaults {
    fn leader_failure(&self) -> bool {
        roll(self.config.leader_failure_probability)
    }

    fn processing_delay(&self) -> Duration {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms.max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    fn refuse_prepare(&self) -> bool {
        roll(self.config.prepare_refusal_probability)
    }
}

fn roll(probability: f64) -> bool {
    probability > 0.0 && rand::rng().random_bool(probability.min(1.0))
}

/// Build the injector selected by configuration
pub fn from_config(config: &FaultConfig) -> std::sync::Arc<dyn FaultInjector> {
    if config.enabled {
        tracing::warn!(
            leader_failure = config.leader_failure_probability,
            prepare_refusal = config.prepare_refusal_probability,
            "Random fault injection enabled"
        );
        std::sync::Arc::new(RandomFaults::new(config.clone()))
    } else {
        std::sync::Arc::new(NoFaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_faults_bounds() {
        let faults = RandomFaults::new(FaultConfig {
            enabled: true,
            leader_failure_probability: 0.0,
            prepare_refusal_probability: 1.0,
            min_delay_ms: 10,
            max_delay_ms: 20,
        });

        for _ in 0..50 {
            assert!(!faults.leader_failure());
            assert!(faults.refuse_prepare());
            let delay = faults.processing_delay();
            assert!(delay >= Duration::from_millis(10) && delay <= Duration::from_millis(20));
        }
    }

    #[test]
    fn test_disabled_config_yields_no_faults() {
        let injector = from_config(&FaultConfig::default());
        assert!(!injector.leader_failure());
        assert_eq!(injector.processing_delay(), Duration::ZERO);
    }
}
