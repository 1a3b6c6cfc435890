use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::common::errors::Result;
use crate::strategy::traits::DecisionProvider;
use crate::strategy::types::{DecisionContext, RawDecision};

/// Strategy key the benchmark registers under
pub const BUY_AND_HOLD: &str = "buy_and_hold";

/// Buy-and-hold benchmark
///
/// Splits the initial balance equally across the tracked assets, buys each
/// one once (one asset per cycle, in configured order) and never sells.
/// Stop losses still apply through the risk sweep, same as for any trader,
/// and an asset stopped out is never bought back.
#[derive(Debug, Default, Clone)]
pub struct BuyAndHoldProvider;

impl BuyAndHoldProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecisionProvider for BuyAndHoldProvider {
    fn name(&self) -> &str {
        BUY_AND_HOLD
    }

    async fn make_decision(&self, ctx: &DecisionContext) -> Result<RawDecision> {
        if ctx.assets.is_empty() {
            return Ok(RawDecision::hold("No tracked assets"));
        }

        let allocation = ctx.portfolio.initial_balance / Decimal::from(ctx.assets.len());
        let next = ctx
            .assets
            .iter()
            .find(|asset| {
                !ctx.portfolio.has_position(asset)
                    && !ctx.portfolio.has_bought(asset)
                    && ctx.market.price_of(asset).is_some()
            });

        match next {
            Some(asset) => {
                let investment = allocation.min(ctx.portfolio.balance);
                if investment <= Decimal::ZERO {
                    return Ok(RawDecision::hold("Fully allocated"));
                }
                let mut decision = RawDecision::buy(
                    asset.clone(),
                    investment,
                    format!("Benchmark allocation into {}", asset),
                );
                decision.confidence = Some(1.0);
                Ok(decision)
            }
            None => Ok(RawDecision::hold("Holding benchmark allocation")),
        }
    }
}
