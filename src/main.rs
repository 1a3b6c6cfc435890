//! Trading Arena - Main Entry Point
//!
//! Runs the paper-trading engine against a simulated market until Ctrl-C,
//! or for a single decision cycle with `--once`.

use anyhow::Result;
use clap::Parser;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use trading_arena::config::load_config;
use trading_arena::engine::seed_traders;
use trading_arena::trading::CostModel;
use trading_arena::{
    BuyAndHoldProvider, CostConfigCache, CycleScheduler, MarketDataProvider, MemoryStore,
    ProviderRegistry, SchedulerSettings, SimulatedMarket, Store, TradeExecutor, BUY_AND_HOLD,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Minutes between decision cycles; overrides the config file
    #[arg(long, env = "ARENA_INTERVAL_MINUTES")]
    interval_minutes: Option<u64>,

    /// Run a single decision cycle and snapshot, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(Some(&args.config))?;

    // Initialize logging
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Trading Arena");
    info!("Configuration file: {}", args.config);

    let store = Arc::new(MemoryStore::new());
    if store.load_cost_config().await?.is_none() {
        store.save_cost_config(&config.costs).await?;
    }
    let created = seed_traders(store.as_ref(), &config.traders).await?;
    info!(created, total = config.traders.len(), "Traders ready");

    // Config keys arrive lowercased
    let mut start_prices: HashMap<String, Decimal> = config
        .settings
        .simulated_prices
        .iter()
        .map(|(asset, price)| (asset.to_uppercase(), *price))
        .collect();
    for (asset, price) in [("BTC", dec!(50000)), ("ETH", dec!(3000)), ("SOL", dec!(150))] {
        start_prices.entry(asset.to_string()).or_insert(price);
    }
    let market = Arc::new(SimulatedMarket::new(
        start_prices,
        config.settings.simulated_volatility,
    ));
    info!(source = market.source_name(), assets = ?config.engine.assets, "Market data ready");

    let providers =
        ProviderRegistry::new().register(BUY_AND_HOLD, Arc::new(BuyAndHoldProvider::new()));
    for strategy in &config.engine.enabled_strategies {
        if !providers.strategies().contains(strategy) {
            warn!(strategy = %strategy, "Enabled strategy has no registered provider");
        }
    }

    let store: Arc<dyn Store> = store;
    let costs = Arc::new(CostConfigCache::with_ttl(
        store.clone(),
        Duration::from_secs(config.engine.cost_cache_ttl_seconds),
    ));
    let executor = Arc::new(TradeExecutor::new(
        store.clone(),
        costs.clone(),
        CostModel::default(),
    ));
    let scheduler = CycleScheduler::new(
        store,
        market,
        Arc::new(providers),
        costs,
        executor,
        SchedulerSettings::from(&config.engine),
    );

    info!("Application initialized successfully");

    if args.once {
        let report = scheduler.run_decision_cycle().await?;
        info!(
            traders = report.outcomes.len(),
            executed = report.executed_count(),
            "Decision cycle complete"
        );
        let outcome = scheduler.run_snapshot_cycle().await?;
        info!(?outcome, "Snapshot complete");
        return Ok(());
    }

    let minutes = args
        .interval_minutes
        .unwrap_or(config.engine.decision_interval_minutes);
    scheduler.start(minutes).await?;

    // Keep the application running
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    if scheduler.is_running() {
        scheduler.stop().await?;
    }

    Ok(())
}
