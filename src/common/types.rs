//! Ledger and market types shared across the engine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A competing trader and its lifetime aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trader {
    pub id: String,
    pub name: String,
    /// Strategy key used to look up the decision provider
    pub strategy: String,
    /// Free cash
    pub balance: Decimal,
    pub initial_balance: Decimal,
    /// Realized P&L across all closed or reduced positions
    pub total_pnl: Decimal,
    /// Number of sells executed
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    /// Provider usage cost accrued by decision calls
    pub api_costs: Decimal,
    pub fees_paid: Decimal,
    pub slippage_paid: Decimal,
    pub api_calls: u32,
    pub created_at: DateTime<Utc>,
}

impl Trader {
    /// Create a trader with a fresh cash balance and zeroed aggregates
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        strategy: impl Into<String>,
        initial_balance: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            strategy: strategy.into(),
            balance: initial_balance,
            initial_balance,
            total_pnl: Decimal::ZERO,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            api_costs: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
            slippage_paid: Decimal::ZERO,
            api_calls: 0,
            created_at: Utc::now(),
        }
    }
}

/// Exit plan attached to a position when it is opened
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub profit_target: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub invalidation_condition: Option<String>,
}

/// A (trader, asset) holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub trader_id: String,
    pub asset: String,
    pub quantity: Decimal,
    /// Cost-inclusive entry price
    pub entry_price: Decimal,
    pub current_price: Decimal,
    /// Cost basis of the units still held
    pub invested_value: Decimal,
    pub current_value: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub stop_loss: Option<Decimal>,
    pub profit_target: Option<Decimal>,
    pub invalidation_condition: Option<String>,
    pub is_active: bool,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Revalue the held quantity at a new market price
    pub fn mark_to_market(&mut self, price: Decimal) {
        self.current_price = price;
        self.current_value = self.quantity * price;
        self.unrealized_pnl = self.current_value - self.invested_value;
        self.updated_at = Utc::now();
    }
}

/// Immutable record of an executed order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub trader_id: String,
    pub asset: String,
    pub side: Side,
    /// Market price at execution
    pub price: Decimal,
    /// Units bought (net) or sold
    pub quantity: Decimal,
    /// BUY: units before costs. SELL: proceeds before costs.
    pub gross_amount: Decimal,
    /// BUY: units after costs. SELL: proceeds after costs.
    pub net_amount: Decimal,
    /// Quote currency
    pub fee: Decimal,
    /// Quote currency
    pub slippage: Decimal,
    pub realized_pnl: Option<Decimal>,
    pub reasoning: String,
    pub position_id: Option<Uuid>,
    pub executed_at: DateTime<Utc>,
}

/// Action recorded on a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionKind {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionKind::Buy => write!(f, "BUY"),
            DecisionKind::Sell => write!(f, "SELL"),
            DecisionKind::Hold => write!(f, "HOLD"),
        }
    }
}

/// Token and cost telemetry reported by a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub cost_usd: Decimal,
}

/// Advisory record of one strategy invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub trader_id: String,
    pub action: DecisionKind,
    pub asset: Option<String>,
    pub amount: Option<Decimal>,
    pub reasoning: String,
    pub confidence: Option<f64>,
    pub exit_plan: ExitPlan,
    pub risk_usd: Option<Decimal>,
    pub executed: bool,
    pub usage: Option<Usage>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time market view of one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub asset: String,
    pub price: Decimal,
    #[serde(default)]
    pub change_24h_pct: Decimal,
    #[serde(default)]
    pub high_24h: Decimal,
    #[serde(default)]
    pub low_24h: Decimal,
    #[serde(default)]
    pub volume_24h: Decimal,
    /// Named indicator series (e.g. "rsi_14"), oldest first
    #[serde(default)]
    pub indicators: BTreeMap<String, Vec<f64>>,
}

impl AssetSnapshot {
    /// Create a snapshot carrying only a price
    pub fn with_price(asset: impl Into<String>, price: Decimal) -> Self {
        Self {
            asset: asset.into(),
            price,
            change_24h_pct: Decimal::ZERO,
            high_24h: price,
            low_24h: price,
            volume_24h: Decimal::ZERO,
            indicators: BTreeMap::new(),
        }
    }
}

/// Market data fetched for one decision cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub assets: Vec<AssetSnapshot>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketData {
    pub fn new(assets: Vec<AssetSnapshot>) -> Self {
        Self {
            assets,
            fetched_at: Utc::now(),
        }
    }

    /// Get the snapshot for an asset, ignoring symbol case
    pub fn get(&self, asset: &str) -> Option<&AssetSnapshot> {
        self.assets
            .iter()
            .find(|a| a.asset.eq_ignore_ascii_case(asset))
    }

    /// Get a usable (positive) price for an asset
    pub fn price_of(&self, asset: &str) -> Option<Decimal> {
        self.get(asset)
            .map(|a| a.price)
            .filter(|p| *p > Decimal::ZERO)
    }
}

/// Persisted copy of a cycle's market data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: Uuid,
    pub data: MarketData,
    pub recorded_at: DateTime<Utc>,
}

/// Valuation row written by the snapshot cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub trader_id: String,
    /// Truncated to whole seconds; unique per trader
    pub timestamp: DateTime<Utc>,
    pub balance: Decimal,
    pub positions_value: Decimal,
    pub total_value: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
}

/// Portfolio view handed to a decision provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub balance: Decimal,
    pub initial_balance: Decimal,
    pub total_value: Decimal,
    pub realized_pnl: Decimal,
    pub positions: Vec<Position>,
    /// Every asset the trader has ever bought, open or closed
    #[serde(default)]
    pub bought_assets: BTreeSet<String>,
}

impl PortfolioState {
    pub fn from_ledger(trader: &Trader, positions: Vec<Position>) -> Self {
        let positions_value: Decimal = positions.iter().map(|p| p.current_value).sum();
        let bought_assets = positions.iter().map(|p| p.asset.clone()).collect();
        Self {
            balance: trader.balance,
            initial_balance: trader.initial_balance,
            total_value: trader.balance + positions_value,
            realized_pnl: trader.total_pnl,
            positions,
            bought_assets,
        }
    }

    /// Add the assets of past BUY trades to the purchase history
    pub fn with_trade_history(mut self, trades: &[Trade]) -> Self {
        self.bought_assets.extend(
            trades
                .iter()
                .filter(|t| t.side == Side::Buy)
                .map(|t| t.asset.clone()),
        );
        self
    }

    /// Check if the trader ever bought an asset, even if since closed
    pub fn has_bought(&self, asset: &str) -> bool {
        self.bought_assets.contains(asset)
    }

    /// Check if we hold an active position in an asset
    pub fn has_position(&self, asset: &str) -> bool {
        self.positions.iter().any(|p| p.asset == asset && p.is_active)
    }
}
