use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::common::errors::{EngineError, Result};
use crate::common::types::{PortfolioSnapshot, Trader};
use crate::store::Store;
use crate::trading::lock::ExecutionLock;

/// Result of one snapshot tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// An order was executing; nothing was read or written
    Skipped,
    Recorded { written: usize, conflicts: usize },
}

/// Records point-in-time portfolio valuations
///
/// Read-only over the ledger. A tick that finds the execution lock held is
/// dropped outright, never queued.
pub struct PerformanceSnapshotter {
    store: Arc<dyn Store>,
    lock: ExecutionLock,
}

impl PerformanceSnapshotter {
    pub fn new(store: Arc<dyn Store>, lock: ExecutionLock) -> Self {
        Self { store, lock }
    }

    /// Value every trader and append one row each
    pub async fn snapshot(&self) -> Result<SnapshotOutcome> {
        self.snapshot_at(Utc::now()).await
    }

    pub(crate) async fn snapshot_at(&self, now: DateTime<Utc>) -> Result<SnapshotOutcome> {
        if self.lock.is_held() {
            debug!("Execution in progress, skipping snapshot");
            return Ok(SnapshotOutcome::Skipped);
        }

        let timestamp = now.trunc_subsecs(0);
        let traders = self.store.list_traders().await?;
        let mut written = 0;
        let mut conflicts = 0;

        for trader in traders {
            let row = match self.valuation(&trader, timestamp).await {
                Ok(row) => row,
                Err(e) => {
                    warn!(trader = %trader.id, error = %e, "Failed to value portfolio");
                    continue;
                }
            };

            match self.store.insert_portfolio_snapshot(&row).await {
                Ok(()) => written += 1,
                Err(EngineError::PersistenceConflict(_)) => conflicts += 1,
                Err(e) => warn!(trader = %trader.id, error = %e, "Failed to record snapshot"),
            }
        }

        debug!(written, conflicts, "Portfolio snapshot recorded");
        Ok(SnapshotOutcome::Recorded { written, conflicts })
    }

    async fn valuation(&self, trader: &Trader, timestamp: DateTime<Utc>) -> Result<PortfolioSnapshot> {
        let positions = self.store.list_active_positions(Some(&trader.id)).await?;
        let positions_value: Decimal = positions.iter().map(|p| p.current_value).sum();
        let total_value = trader.balance + positions_value;
        let pnl = total_value - trader.initial_balance;
        let pnl_pct = if trader.initial_balance > Decimal::ZERO {
            (pnl / trader.initial_balance * dec!(100)).round_dp(4)
        } else {
            Decimal::ZERO
        };

        Ok(PortfolioSnapshot {
            trader_id: trader.id.clone(),
            timestamp,
            balance: trader.balance,
            positions_value,
            total_value,
            pnl,
            pnl_pct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::ExitPlan;
    use crate::store::MemoryStore;
    use crate::trading::cost_cache::CostConfigCache;
    use crate::trading::costs::{CostConfig, CostModel};
    use crate::trading::executor::{BuyOrder, TradeExecutor};
    use rust_decimal_macros::dec;

    async fn setup() -> (Arc<MemoryStore>, TradeExecutor, PerformanceSnapshotter) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_trader(&Trader::new("t1", "One", "test", dec!(100)))
            .await
            .unwrap();
        store
            .insert_trader(&Trader::new("t2", "Two", "test", dec!(200)))
            .await
            .unwrap();
        store
            .save_cost_config(&CostConfig::fee_only(dec!(0.001)))
            .await
            .unwrap();
        let executor = TradeExecutor::new(
            store.clone(),
            Arc::new(CostConfigCache::new(store.clone())),
            CostModel::with_fixed_slippage(Decimal::ZERO),
        );
        let snapshotter = PerformanceSnapshotter::new(store.clone(), executor.lock());
        (store, executor, snapshotter)
    }

    #[tokio::test]
    async fn test_values_balance_plus_positions() {
        let (store, executor, snapshotter) = setup().await;
        executor
            .execute_buy(BuyOrder {
                trader_id: "t1".into(),
                asset: "BTC".into(),
                investment: dec!(50),
                price: dec!(50000),
                reasoning: "test".into(),
                exit_plan: ExitPlan::default(),
            })
            .await
            .unwrap();

        let outcome = snapshotter.snapshot().await.unwrap();
        assert_eq!(outcome, SnapshotOutcome::Recorded { written: 2, conflicts: 0 });

        let rows = store.list_portfolio_snapshots("t1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].balance, dec!(50));
        assert_eq!(rows[0].positions_value, dec!(49.95));
        assert_eq!(rows[0].total_value, dec!(99.95));
        assert_eq!(rows[0].pnl, dec!(-0.05));
        assert_eq!(rows[0].pnl_pct, dec!(-0.05));
    }

    #[tokio::test]
    async fn test_skips_while_lock_held() {
        let (store, executor, snapshotter) = setup().await;
        let guard = executor.lock().try_acquire("buy").unwrap();

        let outcome = snapshotter.snapshot().await.unwrap();
        assert_eq!(outcome, SnapshotOutcome::Skipped);
        assert!(store.list_portfolio_snapshots("t1").await.unwrap().is_empty());
        assert!(store.list_portfolio_snapshots("t2").await.unwrap().is_empty());

        drop(guard);
        assert!(matches!(
            snapshotter.snapshot().await.unwrap(),
            SnapshotOutcome::Recorded { written: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_duplicate_timestamp_is_ignored() {
        let (store, _executor, snapshotter) = setup().await;
        let now = Utc::now();

        snapshotter.snapshot_at(now).await.unwrap();
        let outcome = snapshotter.snapshot_at(now).await.unwrap();

        assert_eq!(outcome, SnapshotOutcome::Recorded { written: 0, conflicts: 2 });
        assert_eq!(store.list_portfolio_snapshots("t2").await.unwrap().len(), 1);
    }
}
