//! Error types for the engine

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias using our EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// An active position already exists for this trader and asset
    #[error("Position already open: trader {trader_id} already holds {asset}")]
    PositionExists { trader_id: String, asset: String },

    /// Trader cash does not cover the requested investment
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    /// No active position to sell
    #[error("Position not found: trader {trader_id} holds no {asset}")]
    PositionNotFound { trader_id: String, asset: String },

    /// Trader does not exist in the store
    #[error("Trader not found: {0}")]
    TraderNotFound(String),

    /// Order parameters failed validation (non-positive amount or price)
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// No usable price for an asset in the current market data
    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    /// Market data or decision provider failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Duplicate row rejected by the store
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    /// Lifecycle call that does not match the current engine state
    #[error("State inconsistency: {0}")]
    StateInconsistency(String),

    /// The execution lock is held by another order
    #[error("Another order is currently executing")]
    ExecutionInProgress,

    /// Generic store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Errors caused by the order itself rather than by infrastructure.
    ///
    /// These leave the associated decision unexecuted and never abort a cycle.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::PositionExists { .. }
                | EngineError::InsufficientBalance { .. }
                | EngineError::PositionNotFound { .. }
                | EngineError::TraderNotFound(_)
                | EngineError::InvalidOrder(_)
                | EngineError::PriceUnavailable(_)
        )
    }
}

impl From<tokio::time::error::Elapsed> for EngineError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        EngineError::Timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validation_classification() {
        let err = EngineError::InsufficientBalance {
            required: dec!(50),
            available: dec!(10),
        };
        assert!(err.is_validation());
        assert!(!EngineError::ExecutionInProgress.is_validation());
        assert!(!EngineError::Store("down".into()).is_validation());
    }

    #[test]
    fn test_error_messages() {
        let err = EngineError::PositionExists {
            trader_id: "t1".into(),
            asset: "BTC".into(),
        };
        assert_eq!(err.to_string(), "Position already open: trader t1 already holds BTC");
    }
}
