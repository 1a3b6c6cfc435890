use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::types::{DecisionKind, ExitPlan, MarketData, PortfolioState, Usage};

/// Decision payload as a provider reports it
///
/// Every field except the action is optional. Nothing here is trusted until
/// [`RawDecision::validate`] turns it into a [`TradeAction`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDecision {
    pub action: String,
    #[serde(default)]
    pub asset: Option<String>,
    /// BUY: quote currency to invest. SELL: units to sell.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub profit_target: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub invalidation_condition: Option<String>,
    #[serde(default)]
    pub risk_usd: Option<Decimal>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl RawDecision {
    /// Create a HOLD decision
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            action: "HOLD".to_string(),
            reasoning: reasoning.into(),
            ..Self::default()
        }
    }

    /// Create a BUY decision investing `amount` quote currency
    pub fn buy(asset: impl Into<String>, amount: Decimal, reasoning: impl Into<String>) -> Self {
        Self {
            action: "BUY".to_string(),
            asset: Some(asset.into()),
            amount: Some(amount),
            reasoning: reasoning.into(),
            ..Self::default()
        }
    }

    /// Create a SELL decision; `None` sells the whole position
    pub fn sell(
        asset: impl Into<String>,
        amount: Option<Decimal>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            action: "SELL".to_string(),
            asset: Some(asset.into()),
            amount,
            reasoning: reasoning.into(),
            ..Self::default()
        }
    }

    /// HOLD standing in for a provider that failed
    pub fn hold_on_failure(error: impl std::fmt::Display) -> Self {
        Self::hold(format!("Provider failed, holding: {}", error))
    }

    /// Parse a JSON payload
    pub fn from_json(payload: &str) -> serde_json::Result<Self> {
        serde_json::from_str(payload)
    }

    pub fn exit_plan(&self) -> ExitPlan {
        ExitPlan {
            profit_target: self.profit_target,
            stop_loss: self.stop_loss,
            invalidation_condition: self.invalidation_condition.clone(),
        }
    }

    /// Validate into an executable action
    ///
    /// Unknown actions and missing required fields downgrade to HOLD with the
    /// rejection reason.
    pub fn validate(&self) -> TradeAction {
        let asset = self
            .asset
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_uppercase);

        match self.action.trim().to_uppercase().as_str() {
            "BUY" => match (asset, self.amount) {
                (Some(asset), Some(investment)) if investment > Decimal::ZERO => TradeAction::Buy {
                    asset,
                    investment,
                    exit_plan: self.exit_plan(),
                },
                (None, _) => TradeAction::rejected("BUY without an asset"),
                _ => TradeAction::rejected("BUY without a positive amount"),
            },
            "SELL" => match (asset, self.amount) {
                (Some(_), Some(quantity)) if quantity <= Decimal::ZERO => {
                    TradeAction::rejected("SELL with a non-positive amount")
                }
                (Some(asset), quantity) => TradeAction::Sell { asset, quantity },
                (None, _) => TradeAction::rejected("SELL without an asset"),
            },
            "HOLD" => TradeAction::Hold { rejected: None },
            other => TradeAction::rejected(format!("unknown action '{}'", other)),
        }
    }
}

/// Validated decision, ready for the executor
#[derive(Debug, Clone, PartialEq)]
pub enum TradeAction {
    Buy {
        asset: String,
        investment: Decimal,
        exit_plan: ExitPlan,
    },
    Sell {
        asset: String,
        /// `None` sells everything held
        quantity: Option<Decimal>,
    },
    Hold {
        /// Why a BUY/SELL payload was downgraded, if it was
        rejected: Option<String>,
    },
}

impl TradeAction {
    fn rejected(reason: impl Into<String>) -> Self {
        Self::Hold {
            rejected: Some(reason.into()),
        }
    }

    pub fn kind(&self) -> DecisionKind {
        match self {
            TradeAction::Buy { .. } => DecisionKind::Buy,
            TradeAction::Sell { .. } => DecisionKind::Sell,
            TradeAction::Hold { .. } => DecisionKind::Hold,
        }
    }

    pub fn asset(&self) -> Option<&str> {
        match self {
            TradeAction::Buy { asset, .. } | TradeAction::Sell { asset, .. } => Some(asset),
            TradeAction::Hold { .. } => None,
        }
    }

    /// Returns true if this action should reach the executor
    pub fn is_trade(&self) -> bool {
        !matches!(self, TradeAction::Hold { .. })
    }
}

/// Inputs handed to a decision provider for one invocation
#[derive(Debug, Clone)]
pub struct DecisionContext {
    pub trader_id: String,
    pub trader_name: String,
    /// Model selected for this strategy, if any
    pub model: Option<String>,
    /// Tracked assets for this experiment
    pub assets: Vec<String>,
    pub market: MarketData,
    pub portfolio: PortfolioState,
    pub cycle_started_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_buy_requires_asset_and_amount() {
        let action = RawDecision::buy("btc", dec!(25), "breakout").validate();
        assert_eq!(
            action,
            TradeAction::Buy {
                asset: "BTC".into(),
                investment: dec!(25),
                exit_plan: ExitPlan::default(),
            }
        );

        let mut missing_amount = RawDecision::buy("BTC", dec!(25), "x");
        missing_amount.amount = None;
        assert!(matches!(
            missing_amount.validate(),
            TradeAction::Hold { rejected: Some(_) }
        ));

        let mut missing_asset = RawDecision::buy("BTC", dec!(25), "x");
        missing_asset.asset = Some("  ".into());
        assert!(!missing_asset.validate().is_trade());

        assert!(!RawDecision::buy("BTC", dec!(-5), "x").validate().is_trade());
    }

    #[test]
    fn test_sell_amount_is_optional() {
        let action = RawDecision::sell("ETH", None, "take profit").validate();
        assert_eq!(
            action,
            TradeAction::Sell {
                asset: "ETH".into(),
                quantity: None
            }
        );
        assert!(!RawDecision::sell("ETH", Some(dec!(0)), "x").validate().is_trade());
    }

    #[test]
    fn test_unknown_action_becomes_hold() {
        let raw = RawDecision {
            action: "YOLO".into(),
            ..RawDecision::default()
        };
        match raw.validate() {
            TradeAction::Hold { rejected } => assert!(rejected.unwrap().contains("YOLO")),
            other => panic!("expected hold, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_loosely_typed_payload() {
        let raw = RawDecision::from_json(
            r#"{
                "action": "buy",
                "asset": "SOL",
                "amount": 40,
                "reasoning": "RSI oversold",
                "confidence": 0.72,
                "profit_target": "180.5",
                "stop_loss": 150,
                "usage": {"prompt_tokens": 1200, "completion_tokens": 300, "cost_usd": "0.004"}
            }"#,
        )
        .unwrap();

        assert_eq!(raw.confidence, Some(0.72));
        assert_eq!(raw.usage.as_ref().unwrap().cost_usd, dec!(0.004));
        match raw.validate() {
            TradeAction::Buy {
                asset,
                investment,
                exit_plan,
            } => {
                assert_eq!(asset, "SOL");
                assert_eq!(investment, dec!(40));
                assert_eq!(exit_plan.profit_target, Some(dec!(180.5)));
                assert_eq!(exit_plan.stop_loss, Some(dec!(150)));
            }
            other => panic!("expected buy, got {:?}", other),
        }
    }

    #[test]
    fn test_hold_on_failure_records_error() {
        let raw = RawDecision::hold_on_failure("rate limited");
        assert_eq!(raw.validate().kind(), DecisionKind::Hold);
        assert!(raw.reasoning.contains("rate limited"));
    }
}
