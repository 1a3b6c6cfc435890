//! Order execution against the position ledger
//!
//! Each (trader, asset) pair moves through
//! `NONE -> OPEN -> (PARTIAL)* -> CLOSED`. A buy opens, sells reduce, and a
//! sell that leaves no more than [`DUST_EPSILON`] units closes.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::cost_cache::CostConfigCache;
use super::costs::CostModel;
use super::lock::ExecutionLock;
use crate::common::errors::{EngineError, Result};
use crate::common::types::{ExitPlan, Position, Side, Trade, Trader};
use crate::store::Store;

/// Remaining quantities at or below this are treated as closed
pub const DUST_EPSILON: Decimal = dec!(0.00000001);

/// Stop loss applied when the caller supplies none (5% below entry)
pub const DEFAULT_STOP_LOSS_FRACTION: Decimal = dec!(0.95);

/// Request to open a position
#[derive(Debug, Clone)]
pub struct BuyOrder {
    pub trader_id: String,
    pub asset: String,
    /// Quote currency to spend
    pub investment: Decimal,
    /// Current market price
    pub price: Decimal,
    pub reasoning: String,
    pub exit_plan: ExitPlan,
}

/// Request to reduce or close a position
#[derive(Debug, Clone)]
pub struct SellOrder {
    pub trader_id: String,
    pub asset: String,
    /// Units to sell; `None` sells the whole position
    pub quantity: Option<Decimal>,
    /// Current market price
    pub price: Decimal,
    pub reasoning: String,
}

/// Outcome of a successful sell
#[derive(Debug, Clone)]
pub struct SellFill {
    pub trade: Trade,
    pub position: Position,
    /// True when the position was closed by this sell
    pub closed: bool,
}

/// Validates and performs buys and sells
///
/// Owns the execution lock; every order holds it from entry until the
/// guard drops, success or failure.
pub struct TradeExecutor {
    store: Arc<dyn Store>,
    costs: Arc<CostConfigCache>,
    model: CostModel,
    lock: ExecutionLock,
}

impl TradeExecutor {
    pub fn new(store: Arc<dyn Store>, costs: Arc<CostConfigCache>, model: CostModel) -> Self {
        Self {
            store,
            costs,
            model,
            lock: ExecutionLock::new(),
        }
    }

    /// Handle for observers that must not read mid-mutation
    pub fn lock(&self) -> ExecutionLock {
        self.lock.clone()
    }

    /// Open a new position
    ///
    /// # Errors
    /// * `InvalidOrder` - non-positive investment or price
    /// * `TraderNotFound` - unknown trader
    /// * `PositionExists` - the pair already has an active position
    /// * `InsufficientBalance` - cash below the investment
    #[instrument(skip(self, order), fields(trader = %order.trader_id, asset = %order.asset))]
    pub async fn execute_buy(&self, order: BuyOrder) -> Result<Position> {
        let _guard = self
            .lock
            .try_acquire("buy")
            .ok_or(EngineError::ExecutionInProgress)?;

        if order.investment <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder(format!(
                "investment must be positive, got {}",
                order.investment
            )));
        }
        if order.price <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder(format!(
                "price must be positive, got {}",
                order.price
            )));
        }

        let mut trader = self.load_trader(&order.trader_id).await?;

        if self
            .store
            .find_active_position(&order.trader_id, &order.asset)
            .await?
            .is_some()
        {
            return Err(EngineError::PositionExists {
                trader_id: order.trader_id,
                asset: order.asset,
            });
        }

        if trader.balance < order.investment {
            return Err(EngineError::InsufficientBalance {
                required: order.investment,
                available: trader.balance,
            });
        }

        let cfg = self.costs.current().await;
        let quote = self.model.net_buy(order.investment, order.price, &cfg);
        if quote.net_amount <= DUST_EPSILON {
            return Err(EngineError::InvalidOrder(format!(
                "investment {} buys no meaningful quantity at {}",
                order.investment, order.price
            )));
        }

        let now = Utc::now();
        let stop_loss = order
            .exit_plan
            .stop_loss
            .or(Some(quote.effective_price * DEFAULT_STOP_LOSS_FRACTION));
        let mut position = Position {
            id: Uuid::new_v4(),
            trader_id: order.trader_id.clone(),
            asset: order.asset.clone(),
            quantity: quote.net_amount,
            entry_price: quote.effective_price,
            current_price: order.price,
            invested_value: order.investment,
            current_value: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            stop_loss,
            profit_target: order.exit_plan.profit_target,
            invalidation_condition: order.exit_plan.invalidation_condition,
            is_active: true,
            opened_at: now,
            updated_at: now,
            closed_at: None,
        };
        position.mark_to_market(order.price);
        self.store.insert_position(&position).await?;

        // Costs are taken in units on a buy; books carry them in quote currency
        let fee_value = quote.fee * order.price;
        let slippage_value = quote.slippage * order.price;

        let trade = Trade {
            id: Uuid::new_v4(),
            trader_id: order.trader_id.clone(),
            asset: order.asset.clone(),
            side: Side::Buy,
            price: order.price,
            quantity: quote.net_amount,
            gross_amount: quote.gross_amount,
            net_amount: quote.net_amount,
            fee: fee_value,
            slippage: slippage_value,
            realized_pnl: None,
            reasoning: order.reasoning,
            position_id: Some(position.id),
            executed_at: now,
        };
        self.store.insert_trade(&trade).await?;

        trader.balance -= order.investment;
        trader.fees_paid += fee_value;
        trader.slippage_paid += slippage_value;
        self.store.update_trader(&trader).await?;

        info!(
            quantity = %position.quantity,
            entry_price = %position.entry_price,
            investment = %order.investment,
            balance = %trader.balance,
            "Opened position"
        );
        Ok(position)
    }

    /// Reduce or close an active position
    ///
    /// The quantity is clamped to what is held. Realized P&L is measured
    /// against the proportional share of invested value being sold.
    ///
    /// # Errors
    /// * `InvalidOrder` - non-positive quantity or price
    /// * `TraderNotFound` - unknown trader
    /// * `PositionNotFound` - no active position for the pair
    #[instrument(skip(self, order), fields(trader = %order.trader_id, asset = %order.asset))]
    pub async fn execute_sell(&self, order: SellOrder) -> Result<SellFill> {
        let _guard = self
            .lock
            .try_acquire("sell")
            .ok_or(EngineError::ExecutionInProgress)?;

        if order.price <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder(format!(
                "price must be positive, got {}",
                order.price
            )));
        }
        if let Some(quantity) = order.quantity {
            if quantity <= Decimal::ZERO {
                return Err(EngineError::InvalidOrder(format!(
                    "quantity must be positive, got {}",
                    quantity
                )));
            }
        }

        let mut trader = self.load_trader(&order.trader_id).await?;
        let mut position = self
            .store
            .find_active_position(&order.trader_id, &order.asset)
            .await?
            .ok_or_else(|| EngineError::PositionNotFound {
                trader_id: order.trader_id.clone(),
                asset: order.asset.clone(),
            })?;

        let held = position.quantity;
        let quantity = order.quantity.map_or(held, |q| q.min(held));

        let cfg = self.costs.current().await;
        let quote = self.model.net_sell(quantity, order.price, &cfg);

        let cost_basis = if held > Decimal::ZERO {
            position.invested_value * quantity / held
        } else {
            position.invested_value
        };
        let realized_pnl = quote.net_value - cost_basis;
        let remaining = held - quantity;
        let closed = remaining <= DUST_EPSILON;

        let now = Utc::now();
        position.realized_pnl += realized_pnl;
        if closed {
            position.quantity = Decimal::ZERO;
            position.invested_value = Decimal::ZERO;
            position.current_price = order.price;
            position.current_value = Decimal::ZERO;
            position.unrealized_pnl = Decimal::ZERO;
            position.is_active = false;
            position.updated_at = now;
            position.closed_at = Some(now);
        } else {
            position.quantity = remaining;
            position.invested_value -= cost_basis;
            position.mark_to_market(order.price);
        }
        self.store.update_position(&position).await?;

        let trade = Trade {
            id: Uuid::new_v4(),
            trader_id: order.trader_id.clone(),
            asset: order.asset.clone(),
            side: Side::Sell,
            price: order.price,
            quantity,
            gross_amount: quote.gross_value,
            net_amount: quote.net_value,
            fee: quote.fee,
            slippage: quote.slippage,
            realized_pnl: Some(realized_pnl),
            reasoning: order.reasoning,
            position_id: Some(position.id),
            executed_at: now,
        };
        self.store.insert_trade(&trade).await?;

        trader.balance += quote.net_value;
        trader.total_pnl += realized_pnl;
        trader.fees_paid += quote.fee;
        trader.slippage_paid += quote.slippage;
        trader.total_trades += 1;
        if realized_pnl > Decimal::ZERO {
            trader.winning_trades += 1;
        } else if realized_pnl < Decimal::ZERO {
            trader.losing_trades += 1;
        }
        self.store.update_trader(&trader).await?;

        if closed {
            info!(
                quantity = %quantity,
                pnl = %realized_pnl,
                balance = %trader.balance,
                "Closed position"
            );
        } else {
            debug!(
                quantity = %quantity,
                remaining = %position.quantity,
                pnl = %realized_pnl,
                "Reduced position"
            );
        }

        Ok(SellFill {
            trade,
            position,
            closed,
        })
    }

    async fn load_trader(&self, trader_id: &str) -> Result<Trader> {
        self.store
            .get_trader(trader_id)
            .await?
            .ok_or_else(|| EngineError::TraderNotFound(trader_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::trading::costs::CostConfig;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    async fn setup(balance: Decimal) -> (Arc<MemoryStore>, TradeExecutor) {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_trader(&Trader::new("t1", "Trader One", "test", balance))
            .await
            .unwrap();
        store
            .save_cost_config(&CostConfig::fee_only(dec!(0.001)))
            .await
            .unwrap();
        let costs = Arc::new(CostConfigCache::new(store.clone()));
        let executor = TradeExecutor::new(
            store.clone(),
            costs,
            CostModel::with_fixed_slippage(Decimal::ZERO),
        );
        (store, executor)
    }

    fn buy(investment: Decimal, price: Decimal) -> BuyOrder {
        BuyOrder {
            trader_id: "t1".into(),
            asset: "BTC".into(),
            investment,
            price,
            reasoning: "test buy".into(),
            exit_plan: ExitPlan::default(),
        }
    }

    fn sell(quantity: Option<Decimal>, price: Decimal) -> SellOrder {
        SellOrder {
            trader_id: "t1".into(),
            asset: "BTC".into(),
            quantity,
            price,
            reasoning: "test sell".into(),
        }
    }

    #[tokio::test]
    async fn test_buy_opens_position_and_debits_gross_investment() {
        let (store, executor) = setup(dec!(100)).await;

        let position = executor.execute_buy(buy(dec!(50), dec!(50000))).await.unwrap();

        assert_eq!(position.quantity, dec!(0.000999));
        assert!(position.entry_price > dec!(50000));
        assert!(position.is_active);
        assert_eq!(position.invested_value, dec!(50));

        let trader = store.get_trader("t1").await.unwrap().unwrap();
        assert_eq!(trader.balance, dec!(50));
        assert_eq!(trader.fees_paid, dec!(0.05));
        assert_eq!(store.list_active_positions(Some("t1")).await.unwrap().len(), 1);

        let trades = store.list_trades("t1").await.unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, Side::Buy);
        assert_eq!(trades[0].gross_amount, dec!(0.001));
        assert_eq!(trades[0].position_id, Some(position.id));
        assert!(!executor.lock().is_held());
    }

    #[tokio::test]
    async fn test_buy_defaults_stop_loss_five_percent_below_entry() {
        let (_store, executor) = setup(dec!(100)).await;
        let position = executor.execute_buy(buy(dec!(50), dec!(50000))).await.unwrap();
        assert_eq!(position.stop_loss, Some(position.entry_price * dec!(0.95)));
        assert_eq!(position.profit_target, None);
    }

    #[tokio::test]
    async fn test_buy_keeps_supplied_exit_plan() {
        let (_store, executor) = setup(dec!(100)).await;
        let mut order = buy(dec!(50), dec!(50000));
        order.exit_plan = ExitPlan {
            profit_target: Some(dec!(60000)),
            stop_loss: Some(dec!(45000)),
            invalidation_condition: Some("close below 44k".into()),
        };
        let position = executor.execute_buy(order).await.unwrap();
        assert_eq!(position.stop_loss, Some(dec!(45000)));
        assert_eq!(position.profit_target, Some(dec!(60000)));
        assert_eq!(position.invalidation_condition.as_deref(), Some("close below 44k"));
    }

    #[tokio::test]
    async fn test_duplicate_buy_fails_without_mutation() {
        let (store, executor) = setup(dec!(100)).await;
        executor.execute_buy(buy(dec!(50), dec!(50000))).await.unwrap();

        let err = executor.execute_buy(buy(dec!(10), dec!(51000))).await.unwrap_err();
        assert!(matches!(err, EngineError::PositionExists { .. }));

        let trader = store.get_trader("t1").await.unwrap().unwrap();
        assert_eq!(trader.balance, dec!(50));
        assert_eq!(store.list_trades("t1").await.unwrap().len(), 1);
        assert_eq!(store.all_positions().len(), 1);
        assert!(!executor.lock().is_held());
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let (store, executor) = setup(dec!(20)).await;
        let err = executor.execute_buy(buy(dec!(50), dec!(50000))).await.unwrap_err();
        assert!(matches!(err, EngineError::InsufficientBalance { .. }));
        assert!(store.all_positions().is_empty());
        assert_eq!(store.get_trader("t1").await.unwrap().unwrap().balance, dec!(20));
    }

    #[tokio::test]
    async fn test_invalid_orders_rejected() {
        let (_store, executor) = setup(dec!(100)).await;
        let err = executor.execute_buy(buy(dec!(0), dec!(50000))).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder(_)));
        let err = executor.execute_buy(buy(dec!(10), dec!(0))).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder(_)));
        let err = executor.execute_sell(sell(Some(dec!(-1)), dec!(100))).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder(_)));
    }

    #[tokio::test]
    async fn test_unknown_trader() {
        let (_store, executor) = setup(dec!(100)).await;
        let mut order = buy(dec!(10), dec!(100));
        order.trader_id = "ghost".into();
        let err = executor.execute_buy(order).await.unwrap_err();
        assert!(matches!(err, EngineError::TraderNotFound(_)));
    }

    #[tokio::test]
    async fn test_sell_without_position() {
        let (_store, executor) = setup(dec!(100)).await;
        let err = executor.execute_sell(sell(None, dec!(50000))).await.unwrap_err();
        assert!(matches!(err, EngineError::PositionNotFound { .. }));
        assert!(!executor.lock().is_held());
    }

    #[tokio::test]
    async fn test_full_round_trip_scenario() {
        let (store, executor) = setup(dec!(100)).await;
        executor.execute_buy(buy(dec!(50), dec!(50000))).await.unwrap();

        let fill = executor
            .execute_sell(sell(Some(dec!(0.000999)), dec!(55000)))
            .await
            .unwrap();

        assert!(fill.closed);
        assert!(!fill.position.is_active);
        assert_eq!(fill.position.quantity, Decimal::ZERO);
        // 54.945 gross, 0.054945 fee
        assert_eq!(fill.trade.net_amount, dec!(54.890055));
        assert_eq!(fill.trade.realized_pnl, Some(dec!(4.890055)));

        let trader = store.get_trader("t1").await.unwrap().unwrap();
        assert_eq!(trader.balance, dec!(104.890055));
        assert_eq!(trader.total_pnl, dec!(4.890055));
        assert_eq!(trader.total_trades, 1);
        assert_eq!(trader.winning_trades, 1);
        assert_eq!(trader.losing_trades, 0);
        assert!(store.list_active_positions(Some("t1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_sell_is_clamped() {
        let (store, executor) = setup(dec!(100)).await;
        executor.execute_buy(buy(dec!(50), dec!(50000))).await.unwrap();

        let fill = executor
            .execute_sell(sell(Some(dec!(5)), dec!(50000)))
            .await
            .unwrap();
        assert!(fill.closed);
        assert_eq!(fill.trade.quantity, dec!(0.000999));
        assert!(store.all_positions().iter().all(|p| p.quantity >= Decimal::ZERO));
    }

    #[tokio::test]
    async fn test_partial_sell_keeps_proportional_basis() {
        let (store, executor) = setup(dec!(1000)).await;
        let opened = executor.execute_buy(buy(dec!(100), dec!(100))).await.unwrap();
        let half = opened.quantity / dec!(2);

        let fill = executor.execute_sell(sell(Some(half), dec!(100))).await.unwrap();
        assert!(!fill.closed);
        assert!(fill.position.is_active);
        assert_eq!(fill.position.quantity, opened.quantity - half);
        assert_eq!(fill.position.invested_value, dec!(50));
        // Same price, fees on both sides: a small loss
        assert!(fill.trade.realized_pnl.unwrap() < Decimal::ZERO);

        let trader = store.get_trader("t1").await.unwrap().unwrap();
        assert_eq!(trader.losing_trades, 1);
        assert_eq!(store.list_active_positions(Some("t1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dust_remainder_closes_position() {
        let (store, executor) = setup(dec!(1000)).await;
        let opened = executor.execute_buy(buy(dec!(100), dec!(100))).await.unwrap();

        let almost_all = opened.quantity - dec!(0.000000001);
        let fill = executor
            .execute_sell(sell(Some(almost_all), dec!(100)))
            .await
            .unwrap();
        assert!(fill.closed);
        assert!(!fill.position.is_active);
        assert!(store.list_active_positions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reopen_after_close() {
        let (store, executor) = setup(dec!(100)).await;
        executor.execute_buy(buy(dec!(50), dec!(50000))).await.unwrap();
        executor.execute_sell(sell(None, dec!(50000))).await.unwrap();
        executor.execute_buy(buy(dec!(10), dec!(50000))).await.unwrap();
        assert_eq!(store.all_positions().len(), 2);
        assert_eq!(store.list_active_positions(Some("t1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_held_lock_rejects_orders() {
        let (store, executor) = setup(dec!(100)).await;
        let guard = executor.lock().try_acquire("external").unwrap();
        let err = executor.execute_buy(buy(dec!(50), dec!(50000))).await.unwrap_err();
        assert!(matches!(err, EngineError::ExecutionInProgress));
        drop(guard);
        assert!(store.all_positions().is_empty());
    }
}
