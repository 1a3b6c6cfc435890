//! Decision provider contract
//!
//! Traders delegate their choices to pluggable providers. The engine only
//! depends on the input/output contract defined here.
//!
//! # Flow
//!
//! ```text
//! DecisionContext ──▶ DecisionProvider::make_decision ──▶ RawDecision
//!                                                            │
//!                                            RawDecision::validate
//!                                                            │
//!                                                            ▼
//!                                  TradeAction::{Buy, Sell, Hold} ──▶ TradeExecutor
//! ```
//!
//! # Components
//!
//! - [`DecisionProvider`]: trait implemented by each strategy
//! - [`DecisionProviderFactory`]: resolves a strategy key (and selected
//!   model) to a provider; [`ProviderRegistry`] is the static implementation
//! - [`RawDecision`]: loosely-typed provider payload
//! - [`TradeAction`]: validated tagged form; malformed payloads become HOLD
//! - [`BuyAndHoldProvider`]: the benchmark every other trader competes with

mod benchmark;
mod traits;
mod types;

pub use benchmark::{BuyAndHoldProvider, BUY_AND_HOLD};
pub use traits::{DecisionProvider, DecisionProviderFactory, ProviderRegistry, SharedProvider};
pub use types::{DecisionContext, RawDecision, TradeAction};

#[cfg(test)]
pub(crate) use traits::MockDecisionProvider;
