use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::costs::CostConfig;
use crate::common::errors::Result;
use crate::store::Store;

/// Default lifetime of a cached cost configuration
pub const DEFAULT_COST_CACHE_TTL: Duration = Duration::from_secs(60);

/// Bounded-TTL cache over the stored [`CostConfig`]
///
/// Reads fall back to `CostConfig::default()` when the store has no row or
/// fails, so order execution never blocks on configuration.
pub struct CostConfigCache {
    store: Arc<dyn Store>,
    ttl: Duration,
    cached: Mutex<Option<(CostConfig, Instant)>>,
}

impl CostConfigCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_ttl(store, DEFAULT_COST_CACHE_TTL)
    }

    pub fn with_ttl(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Get the current configuration, reloading it once the TTL has passed
    pub async fn current(&self) -> CostConfig {
        let cached = self.cached.lock().clone();
        if let Some((config, loaded_at)) = cached {
            if loaded_at.elapsed() < self.ttl {
                return config;
            }
        }

        let config = match self.store.load_cost_config().await {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!("No stored cost configuration, using defaults");
                CostConfig::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load cost configuration, using defaults");
                CostConfig::default()
            }
        };

        *self.cached.lock() = Some((config.clone(), Instant::now()));
        config
    }

    /// Persist a new configuration and drop the cached copy
    ///
    /// The stored version is always one past the current one.
    pub async fn update(&self, mut config: CostConfig) -> Result<CostConfig> {
        let previous = self.current().await;
        config.version = previous.version + 1;
        self.store.save_cost_config(&config).await?;
        self.invalidate();
        info!(
            version = config.version,
            fee_rate = %config.fee_rate,
            slippage_enabled = config.slippage_enabled,
            "Cost configuration updated"
        );
        Ok(config)
    }

    /// Drop the cached copy so the next read goes to the store
    pub fn invalidate(&self) {
        *self.cached.lock() = None;
    }
}
