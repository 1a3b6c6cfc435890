//! Cycle orchestration
//!
//! ```text
//! ┌──────────────────────── decision cycle (slow) ────────────────────────┐
//! │  MarketDataProvider ─▶ market snapshot ─▶ RiskMonitor::sweep          │
//! │        │                                                              │
//! │        ▼  for each enabled trader, one at a time                      │
//! │  DecisionProvider ─▶ DecisionRecord ─▶ usage charge ─▶ TradeExecutor  │
//! └───────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────── snapshot cycle (fast) ────────────────────────┐
//! │  ExecutionLock held? ── yes ─▶ skip tick                              │
//! │        │ no                                                           │
//! │        ▼                                                              │
//! │  PerformanceSnapshotter ─▶ one PortfolioSnapshot per trader           │
//! └───────────────────────────────────────────────────────────────────────┘
//! ```

pub mod scheduler;
pub mod snapshot;

pub use scheduler::{CycleReport, CycleScheduler, SchedulerSettings, TraderOutcome};
pub use snapshot::{PerformanceSnapshotter, SnapshotOutcome};

use tracing::info;

use crate::common::errors::{EngineError, Result};
use crate::common::types::Trader;
use crate::config::types::TraderConfig;
use crate::store::Store;

/// Create the experiment's traders
///
/// Traders that already exist are left untouched, so restarting against
/// the same store does not reset balances. Returns how many were created.
pub async fn seed_traders(store: &dyn Store, traders: &[TraderConfig]) -> Result<usize> {
    let mut created = 0;
    for config in traders {
        if store.get_trader(&config.id).await?.is_some() {
            continue;
        }
        let trader = Trader::new(
            config.id.clone(),
            config.name.clone(),
            config.strategy.clone(),
            config.initial_balance,
        );
        match store.insert_trader(&trader).await {
            Ok(()) => {
                created += 1;
                info!(
                    trader = %trader.id,
                    strategy = %trader.strategy,
                    balance = %trader.balance,
                    "Trader created"
                );
            }
            Err(EngineError::PersistenceConflict(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}
