//! Durable ledger storage
//!
//! The engine only needs single-row CRUD operations plus one shared
//! "is running" flag; atomicity of each call is the store's concern.
//! [`MemoryStore`] is the in-process implementation used by the binary
//! and the tests.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::common::errors::Result;
use crate::common::types::{
    DecisionRecord, MarketSnapshot, PortfolioSnapshot, Position, Trade, Trader,
};
use crate::trading::costs::CostConfig;

/// CRUD access to trader, position, trade, decision and snapshot records
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_trader(&self, trader: &Trader) -> Result<()>;

    async fn get_trader(&self, trader_id: &str) -> Result<Option<Trader>>;

    async fn list_traders(&self) -> Result<Vec<Trader>>;

    async fn update_trader(&self, trader: &Trader) -> Result<()>;

    /// Get the active position for a (trader, asset) pair
    async fn find_active_position(&self, trader_id: &str, asset: &str) -> Result<Option<Position>>;

    /// List active positions for one trader, or for everyone when `None`
    async fn list_active_positions(&self, trader_id: Option<&str>) -> Result<Vec<Position>>;

    /// Insert a new position
    ///
    /// Fails with `PositionExists` if the pair already has an active one.
    async fn insert_position(&self, position: &Position) -> Result<()>;

    async fn update_position(&self, position: &Position) -> Result<()>;

    async fn insert_trade(&self, trade: &Trade) -> Result<()>;

    async fn list_trades(&self, trader_id: &str) -> Result<Vec<Trade>>;

    async fn insert_decision(&self, decision: &DecisionRecord) -> Result<()>;

    async fn mark_decision_executed(&self, decision_id: Uuid) -> Result<()>;

    async fn list_decisions(&self, trader_id: &str) -> Result<Vec<DecisionRecord>>;

    async fn insert_market_snapshot(&self, snapshot: &MarketSnapshot) -> Result<()>;

    /// Append a valuation row
    ///
    /// Fails with `PersistenceConflict` on a duplicate (trader, timestamp).
    async fn insert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()>;

    async fn list_portfolio_snapshots(&self, trader_id: &str) -> Result<Vec<PortfolioSnapshot>>;

    async fn load_cost_config(&self) -> Result<Option<CostConfig>>;

    async fn save_cost_config(&self, config: &CostConfig) -> Result<()>;

    /// Shared flag gating decision-cycle continuation
    async fn is_running(&self) -> Result<bool>;

    async fn set_running(&self, running: bool) -> Result<()>;
}
