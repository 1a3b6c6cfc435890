//! Configuration loader

use config::{Config, Environment, File};
use std::path::Path;

use super::types::AppConfig;
use crate::common::errors::{EngineError, Result};

/// Load configuration from file and environment variables
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with ARENA__, e.g. ARENA__ENGINE__DECISION_INTERVAL_MINUTES)
/// 2. Configuration file (TOML format)
/// 3. Default values
pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    // Try to load from .env file
    dotenvy::dotenv().ok();

    let mut builder = Config::builder();

    if let Some(path) = config_path {
        if Path::new(path).exists() {
            builder = builder.add_source(File::with_name(path).required(false));
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("ARENA")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder
        .build()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    let app: AppConfig = config
        .try_deserialize()
        .map_err(|e| EngineError::Configuration(e.to_string()))?;

    validate(&app)?;
    Ok(app)
}

/// Reject configurations the engine cannot run with
pub fn validate(config: &AppConfig) -> Result<()> {
    if config.engine.decision_interval_minutes == 0 {
        return Err(EngineError::Configuration(
            "engine.decision_interval_minutes must be at least 1".to_string(),
        ));
    }
    if config.engine.snapshot_interval_seconds == 0 {
        return Err(EngineError::Configuration(
            "engine.snapshot_interval_seconds must be at least 1".to_string(),
        ));
    }
    if config.engine.assets.is_empty() {
        return Err(EngineError::Configuration(
            "engine.assets must not be empty".to_string(),
        ));
    }
    if config.costs.fee_rate.is_sign_negative() {
        return Err(EngineError::Configuration(
            "costs.fee_rate must not be negative".to_string(),
        ));
    }

    let mut ids: Vec<&str> = config.traders.iter().map(|t| t.id.as_str()).collect();
    ids.sort_unstable();
    if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
        return Err(EngineError::Configuration(format!(
            "duplicate trader id '{}'",
            pair[0]
        )));
    }
    Ok(())
}
