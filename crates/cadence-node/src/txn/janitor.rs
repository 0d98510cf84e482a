//! Periodic pruning of settled transactions on both sides of 2PC.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::{ParticipantLedger, TransactionManager};

#[derive(Debug, Clone, Copy)]
pub struct CleanupConfig {
    pub interval: Duration,
    /// Minimum age of a settled entry before it is dropped
    pub retention: Duration,
}

/// Counts removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sweep {
    pub transactions: usize,
    pub staged: usize,
}

pub struct TransactionJanitor {
    transactions: Arc<TransactionManager>,
    ledger: Arc<ParticipantLedger>,
    config: CleanupConfig,
}

impl TransactionJanitor {
    pub fn new(
        transactions: Arc<TransactionManager>,
        ledger: Arc<ParticipantLedger>,
        config: CleanupConfig,
    ) -> Self {
        Self {
            transactions,
            ledger,
            config,
        }
    }

    pub async fn sweep(&self) -> Sweep {
        Sweep {
            transactions: self.transactions.cleanup_terminal(self.config.retention).await,
            staged: self.ledger.cleanup_terminal(self.config.retention).await,
        }
    }

    /// Sweep every interval until shutdown
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = ?self.config.interval,
            retention = ?self.config.retention,
            "🧹 Transaction cleanup started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sweep = self.sweep().await;
                    if sweep != Sweep::default() {
                        tracing::debug!(
                            transactions = sweep.transactions,
                            staged = sweep.staged,
                            "Pruned settled transactions"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("🧹 Transaction cleanup shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::Step;
    use cadence_common::Operation;
    use tokio_test::assert_ok;

    fn plan() -> Vec<Step> {
        vec![Step {
            participant: "A".to_string(),
            operation: Operation::Square,
        }]
    }

    fn janitor(retention: Duration) -> TransactionJanitor {
        TransactionJanitor::new(
            Arc::new(TransactionManager::new()),
            Arc::new(ParticipantLedger::new()),
            CleanupConfig {
                interval: Duration::from_millis(10),
                retention,
            },
        )
    }

    #[tokio::test]
    async fn test_sweep_prunes_both_sides() {
        let janitor = janitor(Duration::ZERO);
        let open = janitor.transactions.create(2, plan()).await;
        let done = janitor.transactions.create(3, plan()).await;
        assert_ok!(janitor.transactions.abort(done, "operator").await);
        assert_ok!(janitor.ledger.prepare("coord-1", 1, Operation::Square, 2).await);
        assert_ok!(janitor.ledger.abort("coord-1", 2).await);

        let sweep = janitor.sweep().await;
        assert_eq!(sweep, Sweep { transactions: 1, staged: 1 });
        assert!(janitor.transactions.get(open).await.is_some());
        assert_eq!(janitor.ledger.pending_count().await, 1);
    }

    #[tokio::test]
    async fn test_retention_keeps_recent_entries() {
        let janitor = janitor(Duration::from_secs(3600));
        let done = janitor.transactions.create(3, plan()).await;
        assert_ok!(janitor.transactions.abort(done, "operator").await);
        assert_ok!(janitor.ledger.abort("coord-1", done).await);

        assert_eq!(janitor.sweep().await, Sweep::default());
    }

    #[tokio::test]
    async fn test_run_sweeps_until_shutdown() {
        let janitor = janitor(Duration::ZERO);
        let transactions = janitor.transactions.clone();
        let ledger = janitor.ledger.clone();
        let done = transactions.create(3, plan()).await;
        assert_ok!(transactions.abort(done, "operator").await);
        assert_ok!(ledger.abort("coord-1", done).await);

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(janitor.run(rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(transactions.len().await, 0);
        assert_eq!(ledger.len().await, 0);

        tx.send(()).unwrap();
        assert_ok!(tokio::time::timeout(Duration::from_secs(1), handle).await);
    }
}
