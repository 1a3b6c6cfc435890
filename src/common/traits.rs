//! Trait definitions for external collaborators

use async_trait::async_trait;

use super::errors::Result;
use super::types::AssetSnapshot;

/// Source of market data for the tracked assets
///
/// The engine treats the returned snapshots purely as values: price,
/// 24h statistics and indicator series are passed through to decision
/// providers untouched.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch a snapshot for each of the given assets
    ///
    /// # Arguments
    /// * `assets` - Asset symbols to fetch
    async fn get_all(&self, assets: &[String]) -> Result<Vec<AssetSnapshot>>;

    /// Get the name of the data source
    fn source_name(&self) -> &'static str;
}
