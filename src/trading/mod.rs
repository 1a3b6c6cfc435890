//! Trading and risk engine
//!
//! # Components
//!
//! - [`CostModel`]: fee and slippage arithmetic with an injectable
//!   [`SlippageSource`]
//! - [`CostConfigCache`]: bounded-TTL view of the stored [`CostConfig`]
//! - [`TradeExecutor`]: validated buys and sells against the ledger, guarded
//!   by the [`ExecutionLock`]
//! - [`RiskMonitor`]: forced exits on stop-loss / profit-target crossings

pub mod cost_cache;
pub mod costs;
pub mod executor;
pub mod lock;
pub mod risk;

pub use cost_cache::{CostConfigCache, DEFAULT_COST_CACHE_TTL};
pub use costs::{
    BuyQuote, CostConfig, CostModel, FixedSlippage, RandomSlippage, SellQuote, SlippageSource,
};
pub use executor::{BuyOrder, SellFill, SellOrder, TradeExecutor, DUST_EPSILON};
pub use lock::{ExecutionGuard, ExecutionLock};
pub use risk::{evaluate_exit, ExitReason, ForcedExit, RiskMonitor, SweepReport};
