use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::executor::{SellOrder, TradeExecutor};
use crate::common::errors::{EngineError, Result};
use crate::common::types::{MarketData, Position};
use crate::store::Store;

/// Why the risk sweep forced an exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TargetHit,
    StopHit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TargetHit => write!(f, "target hit"),
            ExitReason::StopHit => write!(f, "stop hit"),
        }
    }
}

/// A forced exit performed during a sweep
#[derive(Debug, Clone)]
pub struct ForcedExit {
    pub trader_id: String,
    pub asset: String,
    pub reason: ExitReason,
    pub price: Decimal,
    pub realized_pnl: Decimal,
}

/// Summary of one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub checked: usize,
    pub exits: Vec<ForcedExit>,
    pub updated: usize,
    pub failures: usize,
}

/// Decide whether a position must be exited at `price`
///
/// The profit target is checked first, so a tick crossing both thresholds
/// exits as a target hit.
pub fn evaluate_exit(position: &Position, price: Decimal) -> Option<ExitReason> {
    if position.profit_target.is_some_and(|target| price >= target) {
        return Some(ExitReason::TargetHit);
    }
    if position.stop_loss.is_some_and(|stop| price <= stop) {
        return Some(ExitReason::StopHit);
    }
    None
}

/// Stop-loss / profit-target sweep over every active position
pub struct RiskMonitor {
    store: Arc<dyn Store>,
    executor: Arc<TradeExecutor>,
}

impl RiskMonitor {
    pub fn new(store: Arc<dyn Store>, executor: Arc<TradeExecutor>) -> Self {
        Self { store, executor }
    }

    /// Check all active positions against the prices in `market`
    ///
    /// A failure on one position is logged and counted; the sweep carries on
    /// with the rest. Only failing to list positions aborts the sweep.
    #[instrument(skip_all)]
    pub async fn sweep(&self, market: &MarketData) -> Result<SweepReport> {
        let positions = self.store.list_active_positions(None).await?;
        let mut report = SweepReport {
            checked: positions.len(),
            ..SweepReport::default()
        };

        for position in positions {
            match self.check_position(position, market).await {
                Ok(Some(exit)) => report.exits.push(exit),
                Ok(None) => report.updated += 1,
                Err((position, e)) => {
                    report.failures += 1;
                    warn!(
                        trader = %position.trader_id,
                        asset = %position.asset,
                        error = %e,
                        "Risk check failed for position"
                    );
                }
            }
        }

        if !report.exits.is_empty() || report.failures > 0 {
            info!(
                checked = report.checked,
                exits = report.exits.len(),
                failures = report.failures,
                "Risk sweep complete"
            );
        } else {
            debug!(checked = report.checked, "Risk sweep complete");
        }
        Ok(report)
    }

    async fn check_position(
        &self,
        mut position: Position,
        market: &MarketData,
    ) -> std::result::Result<Option<ForcedExit>, (Position, EngineError)> {
        let price = match market.price_of(&position.asset) {
            Some(price) => price,
            None => {
                let asset = position.asset.clone();
                return Err((position, EngineError::PriceUnavailable(asset)));
            }
        };

        match evaluate_exit(&position, price) {
            Some(reason) => {
                let order = SellOrder {
                    trader_id: position.trader_id.clone(),
                    asset: position.asset.clone(),
                    quantity: None,
                    price,
                    reasoning: reason.to_string(),
                };
                match self.executor.execute_sell(order).await {
                    Ok(fill) => {
                        info!(
                            trader = %position.trader_id,
                            asset = %position.asset,
                            %price,
                            reason = %reason,
                            "Forced exit"
                        );
                        Ok(Some(ForcedExit {
                            trader_id: position.trader_id,
                            asset: position.asset,
                            reason,
                            price,
                            realized_pnl: fill.trade.realized_pnl.unwrap_or_default(),
                        }))
                    }
                    Err(e) => Err((position, e)),
                }
            }
            None => {
                position.mark_to_market(price);
                match self.store.update_position(&position).await {
                    Ok(()) => Ok(None),
                    Err(e) => Err((position, e)),
                }
            }
        }
    }
}
