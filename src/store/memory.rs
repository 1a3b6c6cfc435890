use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashSet;
use uuid::Uuid;

use super::Store;
use crate::common::errors::{EngineError, Result};
use crate::common::types::{
    DecisionRecord, MarketSnapshot, PortfolioSnapshot, Position, Trade, Trader,
};
use crate::trading::costs::CostConfig;

#[derive(Default)]
struct Tables {
    traders: Vec<Trader>,
    positions: Vec<Position>,
    trades: Vec<Trade>,
    decisions: Vec<DecisionRecord>,
    market_snapshots: Vec<MarketSnapshot>,
    portfolio_snapshots: Vec<PortfolioSnapshot>,
    snapshot_keys: HashSet<(String, DateTime<Utc>)>,
    cost_config: Option<CostConfig>,
    running: bool,
}

/// In-memory [`Store`] backed by a single `RwLock`
///
/// Every call takes the lock once, so each operation is atomic on its own.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of market snapshots recorded so far
    pub fn market_snapshot_count(&self) -> usize {
        self.tables.read().market_snapshots.len()
    }

    /// All positions ever opened, active or not
    pub fn all_positions(&self) -> Vec<Position> {
        self.tables.read().positions.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_trader(&self, trader: &Trader) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.traders.iter().any(|t| t.id == trader.id) {
            return Err(EngineError::PersistenceConflict(format!(
                "trader {} already exists",
                trader.id
            )));
        }
        tables.traders.push(trader.clone());
        Ok(())
    }

    async fn get_trader(&self, trader_id: &str) -> Result<Option<Trader>> {
        Ok(self
            .tables
            .read()
            .traders
            .iter()
            .find(|t| t.id == trader_id)
            .cloned())
    }

    async fn list_traders(&self) -> Result<Vec<Trader>> {
        Ok(self.tables.read().traders.clone())
    }

    async fn update_trader(&self, trader: &Trader) -> Result<()> {
        let mut tables = self.tables.write();
        let slot = tables
            .traders
            .iter_mut()
            .find(|t| t.id == trader.id)
            .ok_or_else(|| EngineError::TraderNotFound(trader.id.clone()))?;
        *slot = trader.clone();
        Ok(())
    }

    async fn find_active_position(&self, trader_id: &str, asset: &str) -> Result<Option<Position>> {
        Ok(self
            .tables
            .read()
            .positions
            .iter()
            .find(|p| p.is_active && p.trader_id == trader_id && p.asset == asset)
            .cloned())
    }

    async fn list_active_positions(&self, trader_id: Option<&str>) -> Result<Vec<Position>> {
        Ok(self
            .tables
            .read()
            .positions
            .iter()
            .filter(|p| p.is_active && trader_id.map_or(true, |id| p.trader_id == id))
            .cloned()
            .collect())
    }

    async fn insert_position(&self, position: &Position) -> Result<()> {
        let mut tables = self.tables.write();
        let duplicate = tables.positions.iter().any(|p| {
            p.is_active && p.trader_id == position.trader_id && p.asset == position.asset
        });
        if position.is_active && duplicate {
            return Err(EngineError::PositionExists {
                trader_id: position.trader_id.clone(),
                asset: position.asset.clone(),
            });
        }
        tables.positions.push(position.clone());
        Ok(())
    }

    async fn update_position(&self, position: &Position) -> Result<()> {
        let mut tables = self.tables.write();
        let slot = tables
            .positions
            .iter_mut()
            .find(|p| p.id == position.id)
            .ok_or_else(|| EngineError::Store(format!("position {} not found", position.id)))?;
        *slot = position.clone();
        Ok(())
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<()> {
        self.tables.write().trades.push(trade.clone());
        Ok(())
    }

    async fn list_trades(&self, trader_id: &str) -> Result<Vec<Trade>> {
        Ok(self
            .tables
            .read()
            .trades
            .iter()
            .filter(|t| t.trader_id == trader_id)
            .cloned()
            .collect())
    }

    async fn insert_decision(&self, decision: &DecisionRecord) -> Result<()> {
        self.tables.write().decisions.push(decision.clone());
        Ok(())
    }

    async fn mark_decision_executed(&self, decision_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        let decision = tables
            .decisions
            .iter_mut()
            .find(|d| d.id == decision_id)
            .ok_or_else(|| EngineError::Store(format!("decision {} not found", decision_id)))?;
        decision.executed = true;
        Ok(())
    }

    async fn list_decisions(&self, trader_id: &str) -> Result<Vec<DecisionRecord>> {
        Ok(self
            .tables
            .read()
            .decisions
            .iter()
            .filter(|d| d.trader_id == trader_id)
            .cloned()
            .collect())
    }

    async fn insert_market_snapshot(&self, snapshot: &MarketSnapshot) -> Result<()> {
        self.tables.write().market_snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn insert_portfolio_snapshot(&self, snapshot: &PortfolioSnapshot) -> Result<()> {
        let mut tables = self.tables.write();
        let key = (snapshot.trader_id.clone(), snapshot.timestamp);
        if !tables.snapshot_keys.insert(key) {
            return Err(EngineError::PersistenceConflict(format!(
                "snapshot for {} at {} already recorded",
                snapshot.trader_id, snapshot.timestamp
            )));
        }
        tables.portfolio_snapshots.push(snapshot.clone());
        Ok(())
    }

    async fn list_portfolio_snapshots(&self, trader_id: &str) -> Result<Vec<PortfolioSnapshot>> {
        Ok(self
            .tables
            .read()
            .portfolio_snapshots
            .iter()
            .filter(|s| s.trader_id == trader_id)
            .cloned()
            .collect())
    }

    async fn load_cost_config(&self) -> Result<Option<CostConfig>> {
        Ok(self.tables.read().cost_config.clone())
    }

    async fn save_cost_config(&self, config: &CostConfig) -> Result<()> {
        self.tables.write().cost_config = Some(config.clone());
        Ok(())
    }

    async fn is_running(&self) -> Result<bool> {
        Ok(self.tables.read().running)
    }

    async fn set_running(&self, running: bool) -> Result<()> {
        self.tables.write().running = running;
        Ok(())
    }
}
