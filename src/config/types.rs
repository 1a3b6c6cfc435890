//! Configuration types

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::strategy::BUY_AND_HOLD;
use crate::trading::costs::CostConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scheduler and market settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Initial cost configuration, used when the store has none
    #[serde(default)]
    pub costs: CostConfig,
    /// Traders created at experiment start
    #[serde(default = "default_traders")]
    pub traders: Vec<TraderConfig>,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            costs: CostConfig::default(),
            traders: default_traders(),
            settings: AppSettings::default(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minutes between decision cycles
    #[serde(default = "default_decision_interval")]
    pub decision_interval_minutes: u64,
    /// Seconds between portfolio snapshots
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_seconds: u64,
    /// Tracked asset symbols
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
    /// Strategy keys invoked each cycle
    #[serde(default = "default_enabled_strategies")]
    pub enabled_strategies: Vec<String>,
    /// Strategy key to model name
    #[serde(default)]
    pub selected_models: HashMap<String, String>,
    /// Market data fetch timeout in seconds
    #[serde(default = "default_market_timeout")]
    pub market_timeout_seconds: u64,
    /// Decision provider call timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_seconds: u64,
    /// Cost configuration cache lifetime in seconds
    #[serde(default = "default_cost_cache_ttl")]
    pub cost_cache_ttl_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_interval_minutes: default_decision_interval(),
            snapshot_interval_seconds: default_snapshot_interval(),
            assets: default_assets(),
            enabled_strategies: default_enabled_strategies(),
            selected_models: HashMap::new(),
            market_timeout_seconds: default_market_timeout(),
            provider_timeout_seconds: default_provider_timeout(),
            cost_cache_ttl_seconds: default_cost_cache_ttl(),
        }
    }
}

fn default_decision_interval() -> u64 {
    60
}

fn default_snapshot_interval() -> u64 {
    30
}

fn default_assets() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()]
}

fn default_enabled_strategies() -> Vec<String> {
    vec![BUY_AND_HOLD.to_string()]
}

fn default_market_timeout() -> u64 {
    30
}

fn default_provider_timeout() -> u64 {
    120
}

fn default_cost_cache_ttl() -> u64 {
    60
}

/// A trader created at experiment start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderConfig {
    pub id: String,
    pub name: String,
    /// Strategy key resolved by the provider factory
    pub strategy: String,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
}

fn default_initial_balance() -> Decimal {
    dec!(100)
}

fn default_traders() -> Vec<TraderConfig> {
    vec![TraderConfig {
        id: "benchmark".to_string(),
        name: "Buy & Hold".to_string(),
        strategy: BUY_AND_HOLD.to_string(),
        initial_balance: default_initial_balance(),
    }]
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Starting prices for the simulated market, by asset
    #[serde(default)]
    pub simulated_prices: HashMap<String, Decimal>,
    /// Per-tick volatility of the simulated market (0.01 = 1%)
    #[serde(default = "default_volatility")]
    pub simulated_volatility: f64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            simulated_prices: HashMap::new(),
            simulated_volatility: default_volatility(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_volatility() -> f64 {
    0.01
}
