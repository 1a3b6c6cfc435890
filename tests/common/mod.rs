//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use trading_arena::engine::seed_traders;
use trading_arena::config::TraderConfig;
use trading_arena::trading::CostModel;
use trading_arena::{
    AssetSnapshot, BuyAndHoldProvider, CostConfig, CostConfigCache, CycleScheduler,
    DecisionContext, DecisionProvider, MarketDataProvider, MemoryStore, ProviderRegistry,
    RawDecision, Result, SchedulerSettings, Store, TradeExecutor, BUY_AND_HOLD,
};

/// Strategy key of the scripted trader
pub const SCRIPTED: &str = "scripted";

/// Starting prices of the tracked assets
pub static START_PRICES: Lazy<HashMap<&'static str, Decimal>> = Lazy::new(|| {
    HashMap::from([
        ("BTC", dec!(50000)),
        ("ETH", dec!(3000)),
        ("SOL", dec!(150)),
    ])
});

/// Market whose prices only move when a test says so
pub struct ScriptedMarket {
    prices: Mutex<HashMap<String, Decimal>>,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(
                START_PRICES
                    .iter()
                    .map(|(asset, price)| (asset.to_string(), *price))
                    .collect(),
            ),
        }
    }

    pub fn set_price(&self, asset: &str, price: Decimal) {
        self.prices.lock().insert(asset.to_string(), price);
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedMarket {
    async fn get_all(&self, assets: &[String]) -> Result<Vec<AssetSnapshot>> {
        let prices = self.prices.lock();
        Ok(assets
            .iter()
            .filter_map(|a| prices.get(a).map(|p| AssetSnapshot::with_price(a.clone(), *p)))
            .collect())
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// Provider that replays queued decisions, then holds
#[derive(Default)]
pub struct ScriptedProvider {
    queue: Mutex<VecDeque<RawDecision>>,
}

impl ScriptedProvider {
    pub fn push(&self, decision: RawDecision) {
        self.queue.lock().push_back(decision);
    }
}

#[async_trait]
impl DecisionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        SCRIPTED
    }

    async fn make_decision(&self, _ctx: &DecisionContext) -> Result<RawDecision> {
        Ok(self
            .queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| RawDecision::hold("script exhausted")))
    }
}

/// A fully wired engine over an in-memory store
pub struct Arena {
    pub store: Arc<MemoryStore>,
    pub market: Arc<ScriptedMarket>,
    pub scripted: Arc<ScriptedProvider>,
    pub scheduler: CycleScheduler,
}

/// Build an engine with a benchmark trader and a scripted trader
///
/// Costs are fee-only (0.1%) so amounts are exact.
pub async fn arena(initial_balance: Decimal) -> Arena {
    arena_with_costs(initial_balance, CostConfig::fee_only(dec!(0.001))).await
}

pub async fn arena_with_costs(initial_balance: Decimal, costs: CostConfig) -> Arena {
    let store = Arc::new(MemoryStore::new());
    store.save_cost_config(&costs).await.unwrap();

    let traders = vec![
        TraderConfig {
            id: "benchmark".into(),
            name: "Buy & Hold".into(),
            strategy: BUY_AND_HOLD.into(),
            initial_balance,
        },
        TraderConfig {
            id: "scripted".into(),
            name: "Scripted".into(),
            strategy: SCRIPTED.into(),
            initial_balance,
        },
    ];
    seed_traders(store.as_ref(), &traders).await.unwrap();

    let market = Arc::new(ScriptedMarket::new());
    let scripted = Arc::new(ScriptedProvider::default());
    let providers = ProviderRegistry::new()
        .register(BUY_AND_HOLD, Arc::new(BuyAndHoldProvider::new()))
        .register(SCRIPTED, scripted.clone());

    let dyn_store: Arc<dyn Store> = store.clone();
    let costs = Arc::new(CostConfigCache::new(dyn_store.clone()));
    let executor = Arc::new(TradeExecutor::new(
        dyn_store.clone(),
        costs.clone(),
        CostModel::with_fixed_slippage(Decimal::ZERO),
    ));

    let settings = SchedulerSettings {
        assets: vec!["BTC".into(), "ETH".into(), "SOL".into()],
        enabled_strategies: vec![BUY_AND_HOLD.into(), SCRIPTED.into()],
        ..SchedulerSettings::default()
    };

    let scheduler = CycleScheduler::new(
        dyn_store,
        market.clone(),
        Arc::new(providers),
        costs,
        executor,
        settings,
    );

    Arena {
        store,
        market,
        scripted,
        scheduler,
    }
}
