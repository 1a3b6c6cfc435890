use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::common::errors::Result;
use crate::strategy::types::{DecisionContext, RawDecision};

/// Core decision provider trait
///
/// A provider looks at market data and one trader's portfolio and proposes a
/// single BUY, SELL or HOLD. Implementations may call out to remote models;
/// the engine bounds each call with a timeout and turns any error into a
/// HOLD, so providers are free to fail.
///
/// # Example
///
/// ```ignore
/// struct AlwaysHold;
///
/// #[async_trait]
/// impl DecisionProvider for AlwaysHold {
///     fn name(&self) -> &str { "always_hold" }
///
///     async fn make_decision(&self, _ctx: &DecisionContext) -> Result<RawDecision> {
///         Ok(RawDecision::hold("nothing to do"))
///     }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    /// Unique identifier for this provider
    fn name(&self) -> &str;

    /// Propose an action for the trader described by `ctx`
    async fn make_decision(&self, ctx: &DecisionContext) -> Result<RawDecision>;
}

/// Shared provider for dynamic dispatch
pub type SharedProvider = Arc<dyn DecisionProvider>;

/// Builds the provider behind a strategy key
///
/// `model` is whatever the control surface selected for the strategy and is
/// passed through untouched.
pub trait DecisionProviderFactory: Send + Sync {
    fn create(&self, strategy: &str, model: Option<&str>) -> Option<SharedProvider>;
}

/// Factory backed by a fixed map of strategy key to provider
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, SharedProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under a strategy key
    pub fn register(mut self, strategy: impl Into<String>, provider: SharedProvider) -> Self {
        self.providers.insert(strategy.into(), provider);
        self
    }

    /// Registered strategy keys, sorted
    pub fn strategies(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.providers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl DecisionProviderFactory for ProviderRegistry {
    fn create(&self, strategy: &str, _model: Option<&str>) -> Option<SharedProvider> {
        self.providers.get(strategy).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lookup() {
        let mut mock = MockDecisionProvider::new();
        mock.expect_name().return_const("mock".to_string());
        let registry = ProviderRegistry::new().register("alpha", Arc::new(mock));

        assert_eq!(registry.strategies(), vec!["alpha".to_string()]);
        let provider = registry.create("alpha", Some("some-model")).unwrap();
        assert_eq!(provider.name(), "mock");
        assert!(registry.create("beta", None).is_none());
    }
}
