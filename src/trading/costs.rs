use rand::Rng;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Global trading cost configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostConfig {
    /// Incremented on every update
    #[serde(default)]
    pub version: u32,
    /// Fee as a fraction of traded value (0.001 = 0.1%)
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    #[serde(default = "default_true")]
    pub slippage_enabled: bool,
    /// Lower bound of the slippage fraction
    #[serde(default = "default_slippage_min")]
    pub slippage_min: Decimal,
    /// Upper bound of the slippage fraction
    #[serde(default = "default_slippage_max")]
    pub slippage_max: Decimal,
    /// Debit provider usage cost from the trader's cash balance
    #[serde(default = "default_true")]
    pub deduct_api_costs: bool,
    /// Fold provider usage cost into the trader's realized P&L
    #[serde(default = "default_true")]
    pub include_costs_in_pnl: bool,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            version: 0,
            fee_rate: default_fee_rate(),
            slippage_enabled: true,
            slippage_min: default_slippage_min(),
            slippage_max: default_slippage_max(),
            deduct_api_costs: true,
            include_costs_in_pnl: true,
        }
    }
}

impl CostConfig {
    /// Fee-only configuration with slippage disabled
    pub fn fee_only(fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            slippage_enabled: false,
            ..Self::default()
        }
    }
}

fn default_fee_rate() -> Decimal {
    dec!(0.001)
}

fn default_slippage_min() -> Decimal {
    dec!(0.0005)
}

fn default_slippage_max() -> Decimal {
    dec!(0.002)
}

fn default_true() -> bool {
    true
}

/// Randomness source for slippage
///
/// Returns a fraction in `[min, max]`. Injected so tests can pin it.
pub trait SlippageSource: Send + Sync {
    fn sample(&self, min: Decimal, max: Decimal) -> Decimal;
}

/// Uniform slippage drawn from the thread-local RNG
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSlippage;

impl SlippageSource for RandomSlippage {
    fn sample(&self, min: Decimal, max: Decimal) -> Decimal {
        let (lo, hi) = match (min.to_f64(), max.to_f64()) {
            (Some(lo), Some(hi)) => (lo, hi),
            _ => return min,
        };
        if hi <= lo {
            return min;
        }
        let rate = rand::thread_rng().gen_range(lo..=hi);
        Decimal::from_f64(rate).unwrap_or(min).clamp(min, max)
    }
}

/// Always returns the same fraction, clamped to the configured bounds
#[derive(Debug, Clone, Copy)]
pub struct FixedSlippage(pub Decimal);

impl SlippageSource for FixedSlippage {
    fn sample(&self, min: Decimal, max: Decimal) -> Decimal {
        self.0.clamp(min, max)
    }
}

/// Result of converting a cash investment into units
#[derive(Debug, Clone, PartialEq)]
pub struct BuyQuote {
    /// Units before costs
    pub gross_amount: Decimal,
    /// Units deducted as fee
    pub fee: Decimal,
    /// Units deducted as slippage
    pub slippage: Decimal,
    /// Units actually received
    pub net_amount: Decimal,
    /// Investment per received unit
    pub effective_price: Decimal,
}

/// Result of converting units into cash proceeds
#[derive(Debug, Clone, PartialEq)]
pub struct SellQuote {
    /// Proceeds before costs
    pub gross_value: Decimal,
    pub fee: Decimal,
    pub slippage: Decimal,
    /// Proceeds actually received
    pub net_value: Decimal,
    /// Proceeds per unit sold
    pub effective_price: Decimal,
}

/// Fee and slippage calculator
///
/// All operations are infallible. Degenerate inputs (non-positive price or
/// amount) produce an empty quote at the market price instead of dividing
/// by zero.
#[derive(Clone)]
pub struct CostModel {
    slippage_source: Arc<dyn SlippageSource>,
}

impl std::fmt::Debug for CostModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostModel").finish_non_exhaustive()
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(Arc::new(RandomSlippage))
    }
}

impl CostModel {
    pub fn new(slippage_source: Arc<dyn SlippageSource>) -> Self {
        Self { slippage_source }
    }

    /// Cost model whose slippage is always `rate`
    pub fn with_fixed_slippage(rate: Decimal) -> Self {
        Self::new(Arc::new(FixedSlippage(rate)))
    }

    /// Fee charged on `value`
    pub fn fee(&self, value: Decimal, cfg: &CostConfig) -> Decimal {
        value * cfg.fee_rate.max(Decimal::ZERO)
    }

    /// Slippage charged on `value`; zero when disabled
    pub fn slippage(&self, value: Decimal, cfg: &CostConfig) -> Decimal {
        if !cfg.slippage_enabled {
            return Decimal::ZERO;
        }
        let mut lo = cfg.slippage_min.max(Decimal::ZERO);
        let mut hi = cfg.slippage_max.max(Decimal::ZERO);
        if lo > hi {
            std::mem::swap(&mut lo, &mut hi);
        }
        value * self.slippage_source.sample(lo, hi).clamp(lo, hi)
    }

    /// Quote a buy of `investment` quote currency at `price`
    pub fn net_buy(&self, investment: Decimal, price: Decimal, cfg: &CostConfig) -> BuyQuote {
        if price <= Decimal::ZERO || investment <= Decimal::ZERO {
            return BuyQuote {
                gross_amount: Decimal::ZERO,
                fee: Decimal::ZERO,
                slippage: Decimal::ZERO,
                net_amount: Decimal::ZERO,
                effective_price: price.max(Decimal::ZERO),
            };
        }

        let gross_amount = investment / price;
        let fee = self.fee(gross_amount, cfg);
        let slippage = self.slippage(gross_amount, cfg);
        let net_amount = (gross_amount - fee - slippage).max(Decimal::ZERO);
        let effective_price = if net_amount > Decimal::ZERO {
            (investment / net_amount).max(price)
        } else {
            price
        };

        BuyQuote {
            gross_amount,
            fee,
            slippage,
            net_amount,
            effective_price,
        }
    }

    /// Quote a sell of `amount` units at `price`
    pub fn net_sell(&self, amount: Decimal, price: Decimal, cfg: &CostConfig) -> SellQuote {
        if price <= Decimal::ZERO || amount <= Decimal::ZERO {
            return SellQuote {
                gross_value: Decimal::ZERO,
                fee: Decimal::ZERO,
                slippage: Decimal::ZERO,
                net_value: Decimal::ZERO,
                effective_price: price.max(Decimal::ZERO),
            };
        }

        let gross_value = amount * price;
        let fee = self.fee(gross_value, cfg);
        let slippage = self.slippage(gross_value, cfg);
        let net_value = (gross_value - fee - slippage).max(Decimal::ZERO);

        SellQuote {
            gross_value,
            fee,
            slippage,
            net_value,
            effective_price: net_value / amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn no_slippage() -> CostModel {
        CostModel::with_fixed_slippage(Decimal::ZERO)
    }

    #[test]
    fn test_default_config() {
        let cfg = CostConfig::default();
        assert_eq!(cfg.fee_rate, dec!(0.001));
        assert!(cfg.slippage_enabled);
        assert!(cfg.slippage_min <= cfg.slippage_max);
    }

    #[test]
    fn test_fee() {
        let cfg = CostConfig::fee_only(dec!(0.001));
        assert_eq!(no_slippage().fee(dec!(1000), &cfg), dec!(1));
    }

    #[test]
    fn test_slippage_disabled_is_zero() {
        let cfg = CostConfig::fee_only(dec!(0.001));
        let model = CostModel::with_fixed_slippage(dec!(0.5));
        assert_eq!(model.slippage(dec!(1000), &cfg), Decimal::ZERO);
    }

    #[test]
    fn test_fixed_slippage_is_clamped_to_bounds() {
        let cfg = CostConfig {
            slippage_min: dec!(0.001),
            slippage_max: dec!(0.002),
            ..CostConfig::default()
        };
        let model = CostModel::with_fixed_slippage(dec!(0.5));
        assert_eq!(model.slippage(dec!(1000), &cfg), dec!(2));
    }

    #[test]
    fn test_random_slippage_stays_in_bounds() {
        let cfg = CostConfig::default();
        let model = CostModel::default();
        for _ in 0..200 {
            let s = model.slippage(dec!(1000), &cfg);
            assert!(s >= dec!(0.5), "slippage {} below min", s);
            assert!(s <= dec!(2), "slippage {} above max", s);
        }
    }

    #[test]
    fn test_inverted_bounds_are_swapped() {
        let cfg = CostConfig {
            slippage_min: dec!(0.003),
            slippage_max: dec!(0.001),
            ..CostConfig::default()
        };
        let model = CostModel::with_fixed_slippage(dec!(0.002));
        assert_eq!(model.slippage(dec!(1000), &cfg), dec!(2));
    }

    #[test]
    fn test_net_buy_scenario() {
        // 50 at 50000 with 0.1% fee: 0.001 gross, 0.000001 fee
        let cfg = CostConfig::fee_only(dec!(0.001));
        let quote = no_slippage().net_buy(dec!(50), dec!(50000), &cfg);
        assert_eq!(quote.gross_amount, dec!(0.001));
        assert_eq!(quote.fee, dec!(0.000001));
        assert_eq!(quote.net_amount, dec!(0.000999));
        assert!(quote.effective_price > dec!(50000));
    }

    #[test]
    fn test_net_buy_never_exceeds_gross() {
        let cfg = CostConfig::default();
        let model = CostModel::default();
        let cases = [
            (dec!(1), dec!(0.5)),
            (dec!(50), dec!(50000)),
            (dec!(1234.56), dec!(3.21)),
            (dec!(0.01), dec!(99999)),
        ];
        for (investment, price) in cases {
            let quote = model.net_buy(investment, price, &cfg);
            assert!(quote.net_amount <= investment / price);
            assert!(quote.effective_price >= price);
        }
    }

    #[test]
    fn test_net_sell_scenario() {
        let cfg = CostConfig::fee_only(dec!(0.001));
        let quote = no_slippage().net_sell(dec!(0.000999), dec!(55000), &cfg);
        assert_eq!(quote.gross_value, dec!(54.945));
        assert_eq!(quote.fee, dec!(0.054945));
        assert_eq!(quote.net_value, dec!(54.890055));
        assert!(quote.effective_price < dec!(55000));
    }

    #[test]
    fn test_degenerate_inputs_do_not_panic() {
        let cfg = CostConfig::default();
        let model = CostModel::default();

        let buy = model.net_buy(dec!(50), Decimal::ZERO, &cfg);
        assert_eq!(buy.net_amount, Decimal::ZERO);

        let sell = model.net_sell(Decimal::ZERO, dec!(100), &cfg);
        assert_eq!(sell.net_value, Decimal::ZERO);
        assert_eq!(sell.effective_price, dec!(100));
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let cfg: CostConfig = serde_json::from_str(r#"{"fee_rate": "0.002"}"#).unwrap();
        assert_eq!(cfg.fee_rate, dec!(0.002));
        assert!(cfg.slippage_enabled);
        assert_eq!(cfg.slippage_max, dec!(0.002));
    }
}
