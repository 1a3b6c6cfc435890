use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

use crate::common::errors::{EngineError, Result};
use crate::common::traits::MarketDataProvider;
use crate::common::types::AssetSnapshot;

/// Prices remembered per asset for 24h stats and indicators
const HISTORY_LEN: usize = 24;

const DEFAULT_START_PRICE: Decimal = dec!(100);

#[derive(Debug, Default)]
struct AssetState {
    history: VecDeque<Decimal>,
}

/// Random-walk market used for paper runs
///
/// Each call moves every requested asset by a normally-ish distributed step
/// of `volatility` and reports the last [`HISTORY_LEN`] ticks as the 24h
/// window.
pub struct SimulatedMarket {
    start_prices: HashMap<String, Decimal>,
    volatility: f64,
    state: Mutex<HashMap<String, AssetState>>,
}

impl SimulatedMarket {
    pub fn new(start_prices: HashMap<String, Decimal>, volatility: f64) -> Self {
        Self {
            start_prices,
            volatility: volatility.abs(),
            state: Mutex::new(HashMap::new()),
        }
    }

    fn step(&self, asset: &str) -> AssetSnapshot {
        let mut state = self.state.lock();
        let entry = state.entry(asset.to_string()).or_default();

        let last = entry.history.back().copied().unwrap_or_else(|| {
            self.start_prices
                .get(asset)
                .copied()
                .unwrap_or(DEFAULT_START_PRICE)
        });

        let mut rng = rand::thread_rng();
        // Sum of uniforms: cheap bell-shaped step
        let shock: f64 = (0..4).map(|_| rng.gen_range(-1.0..=1.0)).sum::<f64>() / 2.0;
        let factor = Decimal::from_f64(1.0 + shock * self.volatility).unwrap_or(Decimal::ONE);
        let price = (last * factor).max(dec!(0.0001)).round_dp(8);

        entry.history.push_back(price);
        while entry.history.len() > HISTORY_LEN {
            entry.history.pop_front();
        }

        snapshot_from_history(asset, &entry.history)
    }
}

fn snapshot_from_history(asset: &str, history: &VecDeque<Decimal>) -> AssetSnapshot {
    let price = history.back().copied().unwrap_or(DEFAULT_START_PRICE);
    let first = history.front().copied().unwrap_or(price);
    let high = history.iter().copied().max().unwrap_or(price);
    let low = history.iter().copied().min().unwrap_or(price);
    let change_24h_pct = if first > Decimal::ZERO {
        ((price - first) / first * dec!(100)).round_dp(4)
    } else {
        Decimal::ZERO
    };

    let closes: Vec<f64> = history.iter().filter_map(|p| p.to_f64()).collect();
    let mut indicators = BTreeMap::new();
    indicators.insert("sma_5".to_string(), rolling_mean(&closes, 5));
    indicators.insert("close".to_string(), closes);

    AssetSnapshot {
        asset: asset.to_string(),
        price,
        change_24h_pct,
        high_24h: high,
        low_24h: low,
        volume_24h: Decimal::ZERO,
        indicators,
    }
}

fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

#[async_trait]
impl MarketDataProvider for SimulatedMarket {
    async fn get_all(&self, assets: &[String]) -> Result<Vec<AssetSnapshot>> {
        if assets.is_empty() {
            return Err(EngineError::Provider("no assets requested".to_string()));
        }
        let snapshots: Vec<AssetSnapshot> = assets.iter().map(|a| self.step(a)).collect();
        debug!(count = snapshots.len(), "Simulated market advanced");
        Ok(snapshots)
    }

    fn source_name(&self) -> &'static str {
        "simulated"
    }
}
