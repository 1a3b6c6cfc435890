//! Trading Arena Library
//!
//! A paper-trading engine in which several decision-making agents each manage
//! an independent portfolio against shared market data, with fees, slippage,
//! exit plans and periodic performance snapshots.

pub mod common;
pub mod config;
pub mod engine;
pub mod market;
pub mod store;
pub mod strategy;
pub mod trading;

// Re-export commonly used types
pub use common::errors::{EngineError, Result};
pub use common::traits::MarketDataProvider;
pub use common::types::{
    AssetSnapshot, DecisionKind, DecisionRecord, ExitPlan, MarketData, PortfolioSnapshot,
    PortfolioState, Position, Side, Trade, Trader, Usage,
};
pub use config::types::AppConfig;
pub use engine::{CycleReport, CycleScheduler, PerformanceSnapshotter, SchedulerSettings};
pub use market::SimulatedMarket;
pub use store::{MemoryStore, Store};

// Strategy types
pub use strategy::{
    BuyAndHoldProvider, DecisionContext, DecisionProvider, DecisionProviderFactory,
    ProviderRegistry, RawDecision, TradeAction, BUY_AND_HOLD,
};

// Trading types
pub use trading::{CostConfig, CostConfigCache, CostModel, RiskMonitor, TradeExecutor};
