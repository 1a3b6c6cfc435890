use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::snapshot::{PerformanceSnapshotter, SnapshotOutcome};
use crate::common::errors::{EngineError, Result};
use crate::common::traits::MarketDataProvider;
use crate::common::types::{
    DecisionKind, DecisionRecord, MarketData, MarketSnapshot, PortfolioState, Trader, Usage,
};
use crate::config::types::EngineConfig;
use crate::store::Store;
use crate::strategy::{
    DecisionContext, DecisionProviderFactory, RawDecision, SharedProvider, TradeAction,
};
use crate::trading::cost_cache::CostConfigCache;
use crate::trading::costs::CostConfig;
use crate::trading::executor::{BuyOrder, SellOrder, TradeExecutor};
use crate::trading::risk::{RiskMonitor, SweepReport};

/// Runtime settings of the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub decision_interval: Duration,
    pub snapshot_interval: Duration,
    /// Assets fetched each decision cycle
    pub assets: Vec<String>,
    /// Strategy keys whose traders are invoked
    pub enabled_strategies: Vec<String>,
    /// Strategy key to model name, passed through to the provider factory
    pub selected_models: HashMap<String, String>,
    pub market_timeout: Duration,
    pub provider_timeout: Duration,
}

impl From<&EngineConfig> for SchedulerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            decision_interval: Duration::from_secs(config.decision_interval_minutes * 60),
            snapshot_interval: Duration::from_secs(config.snapshot_interval_seconds),
            assets: config.assets.iter().map(|a| a.trim().to_uppercase()).collect(),
            enabled_strategies: config.enabled_strategies.clone(),
            selected_models: config.selected_models.clone(),
            market_timeout: Duration::from_secs(config.market_timeout_seconds),
            provider_timeout: Duration::from_secs(config.provider_timeout_seconds),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// What happened to one trader during a decision cycle
#[derive(Debug, Clone)]
pub struct TraderOutcome {
    pub trader_id: String,
    pub action: DecisionKind,
    pub executed: bool,
    pub error: Option<String>,
}

/// Summary of one decision cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub assets_fetched: usize,
    pub sweep: Option<SweepReport>,
    pub outcomes: Vec<TraderOutcome>,
}

impl CycleReport {
    pub fn executed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.executed).count()
    }
}

struct RunningLoops {
    generation: u64,
    shutdown: watch::Sender<bool>,
    _decision: JoinHandle<()>,
    _snapshot: JoinHandle<()>,
}

struct SchedulerInner {
    store: Arc<dyn Store>,
    market: Arc<dyn MarketDataProvider>,
    providers: Arc<dyn DecisionProviderFactory>,
    costs: Arc<CostConfigCache>,
    executor: Arc<TradeExecutor>,
    risk: RiskMonitor,
    snapshotter: PerformanceSnapshotter,
    settings: RwLock<SchedulerSettings>,
    loops: Mutex<Option<RunningLoops>>,
    /// Serializes start and stop across their awaits
    lifecycle: tokio::sync::Mutex<()>,
    generation: AtomicU64,
}

/// Drives the decision and snapshot cycles
///
/// Cloning gives another handle to the same engine. Each loop is a single
/// task ticking on its own interval, so a cycle never overlaps another of the
/// same kind. Stopping is cooperative: a cycle already running finishes.
#[derive(Clone)]
pub struct CycleScheduler {
    inner: Arc<SchedulerInner>,
}

impl CycleScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        market: Arc<dyn MarketDataProvider>,
        providers: Arc<dyn DecisionProviderFactory>,
        costs: Arc<CostConfigCache>,
        executor: Arc<TradeExecutor>,
        settings: SchedulerSettings,
    ) -> Self {
        let risk = RiskMonitor::new(store.clone(), executor.clone());
        let snapshotter = PerformanceSnapshotter::new(store.clone(), executor.lock());
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                market,
                providers,
                costs,
                executor,
                risk,
                snapshotter,
                settings: RwLock::new(settings),
                loops: Mutex::new(None),
                lifecycle: tokio::sync::Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start both loops with a decision interval in minutes
    pub async fn start(&self, interval_minutes: u64) -> Result<()> {
        if interval_minutes == 0 {
            return Err(EngineError::Configuration(
                "decision interval must be at least one minute".to_string(),
            ));
        }
        self.start_with_interval(Duration::from_secs(interval_minutes * 60))
            .await
    }

    /// Start both loops with an arbitrary decision interval
    ///
    /// Nothing is changed unless the start succeeds.
    pub async fn start_with_interval(&self, decision_interval: Duration) -> Result<()> {
        if decision_interval.is_zero() {
            return Err(EngineError::Configuration(
                "decision interval must be positive".to_string(),
            ));
        }
        let snapshot_interval = self.inner.settings.read().snapshot_interval;
        if snapshot_interval.is_zero() {
            return Err(EngineError::Configuration(
                "snapshot interval must be positive".to_string(),
            ));
        }

        let _lifecycle = self.inner.lifecycle.lock().await;
        if self.is_running() {
            return Err(EngineError::StateInconsistency(
                "engine is already running".to_string(),
            ));
        }

        // Set before spawning: the first decision tick reads it
        self.inner.store.set_running(true).await?;
        self.inner.settings.write().decision_interval = decision_interval;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown, shutdown_rx) = watch::channel(false);
        let decision = tokio::spawn(self.clone().decision_loop(
            shutdown_rx.clone(),
            decision_interval,
            generation,
        ));
        let snapshot = tokio::spawn(self.clone().snapshot_loop(shutdown_rx, snapshot_interval));

        *self.inner.loops.lock() = Some(RunningLoops {
            generation,
            shutdown,
            _decision: decision,
            _snapshot: snapshot,
        });

        info!(
            generation,
            ?decision_interval,
            ?snapshot_interval,
            "Engine started"
        );
        Ok(())
    }

    /// Stop both loops
    ///
    /// Returns `StateInconsistency` without side effects if the engine is not
    /// running, so a repeated stop is a harmless no-op.
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;
        let loops = self.inner.loops.lock().take();
        let Some(loops) = loops else {
            debug!("Stop requested while engine is idle");
            return Err(EngineError::StateInconsistency(
                "engine is not running".to_string(),
            ));
        };

        // In-flight cycles finish; only future ticks are suppressed
        let _ = loops.shutdown.send(true);

        if let Err(e) = self.inner.store.set_running(false).await {
            warn!(error = %e, "Failed to clear running flag");
        }
        info!(generation = loops.generation, "Engine stopped");
        Ok(())
    }

    /// Check if the loops are currently scheduled
    pub fn is_running(&self) -> bool {
        self.inner.loops.lock().is_some()
    }

    /// Stop the loops of `generation` without touching the durable flag
    fn halt(&self, generation: u64) {
        let mut loops = self.inner.loops.lock();
        if loops.as_ref().map(|l| l.generation) == Some(generation) {
            if let Some(loops) = loops.take() {
                let _ = loops.shutdown.send(true);
            }
        }
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn set_enabled_strategies(&self, strategies: Vec<String>) {
        info!(?strategies, "Enabled strategies updated");
        self.inner.settings.write().enabled_strategies = strategies;
    }

    pub fn set_selected_models(&self, models: HashMap<String, String>) {
        info!(?models, "Selected models updated");
        self.inner.settings.write().selected_models = models;
    }

    pub fn enabled_strategies(&self) -> Vec<String> {
        self.inner.settings.read().enabled_strategies.clone()
    }

    pub fn selected_models(&self) -> HashMap<String, String> {
        self.inner.settings.read().selected_models.clone()
    }

    pub fn decision_interval(&self) -> Duration {
        self.inner.settings.read().decision_interval
    }

    pub fn settings(&self) -> SchedulerSettings {
        self.inner.settings.read().clone()
    }

    pub async fn cost_config(&self) -> CostConfig {
        self.inner.costs.current().await
    }

    pub async fn update_cost_config(&self, config: CostConfig) -> Result<CostConfig> {
        self.inner.costs.update(config).await
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    async fn decision_loop(
        self,
        mut shutdown: watch::Receiver<bool>,
        period: Duration,
        generation: u64,
    ) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            if !self.decision_tick(generation).await {
                break;
            }
        }
        debug!(generation, "Decision loop exited");
    }

    async fn snapshot_loop(self, mut shutdown: watch::Receiver<bool>, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }
            match self.run_snapshot_cycle().await {
                Ok(SnapshotOutcome::Skipped) => debug!("Snapshot tick skipped"),
                Ok(SnapshotOutcome::Recorded { .. }) => {}
                Err(e) => warn!(error = %e, "Snapshot cycle failed"),
            }
        }
        debug!("Snapshot loop exited");
    }

    /// One decision tick; returns false once the loop must end
    ///
    /// The durable running flag is re-read first so a loop orphaned by an
    /// external stop request shuts itself down.
    async fn decision_tick(&self, generation: u64) -> bool {
        match self.inner.store.is_running().await {
            Ok(true) => {}
            Ok(false) => {
                warn!(generation, "Running flag cleared externally, stopping engine");
                self.halt(generation);
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Could not read running flag, skipping cycle");
                return true;
            }
        }

        match self.run_decision_cycle().await {
            Ok(report) => info!(
                executed = report.executed_count(),
                traders = report.outcomes.len(),
                "Decision cycle complete"
            ),
            Err(e) => error!(error = %e, "Decision cycle aborted"),
        }
        true
    }

    // ------------------------------------------------------------------
    // Cycles
    // ------------------------------------------------------------------

    /// Record one valuation row per trader
    pub async fn run_snapshot_cycle(&self) -> Result<SnapshotOutcome> {
        self.inner.snapshotter.snapshot().await
    }

    /// Run one full decision cycle
    ///
    /// Fails only when market data cannot be fetched or traders cannot be
    /// listed; every per-trader failure is captured in the report.
    #[instrument(skip(self))]
    pub async fn run_decision_cycle(&self) -> Result<CycleReport> {
        let settings = self.settings();
        let started_at = Utc::now();

        let market = self.fetch_market(&settings).await?;

        let record = MarketSnapshot {
            id: Uuid::new_v4(),
            data: market.clone(),
            recorded_at: started_at,
        };
        if let Err(e) = self.inner.store.insert_market_snapshot(&record).await {
            warn!(error = %e, "Failed to persist market snapshot");
        }

        let sweep = match self.inner.risk.sweep(&market).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Risk sweep failed");
                None
            }
        };

        let traders = self.inner.store.list_traders().await?;
        let mut outcomes = Vec::new();

        // Sequential on purpose: bounded provider concurrency, ordered logs
        for trader in traders {
            if !settings.enabled_strategies.contains(&trader.strategy) {
                debug!(trader = %trader.id, strategy = %trader.strategy, "Strategy disabled");
                continue;
            }
            let outcome = match self.run_trader(&trader, &market, &settings, started_at).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(trader = %trader.id, error = %e, "Trader cycle failed");
                    TraderOutcome {
                        trader_id: trader.id.clone(),
                        action: DecisionKind::Hold,
                        executed: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }

        Ok(CycleReport {
            started_at,
            assets_fetched: market.assets.len(),
            sweep,
            outcomes,
        })
    }

    async fn fetch_market(&self, settings: &SchedulerSettings) -> Result<MarketData> {
        let snapshots = timeout(
            settings.market_timeout,
            self.inner.market.get_all(&settings.assets),
        )
        .await
        .map_err(|_| {
            EngineError::Timeout(format!(
                "market data fetch exceeded {:?}",
                settings.market_timeout
            ))
        })??;

        let market = MarketData::new(snapshots);
        let missing: Vec<&String> = settings
            .assets
            .iter()
            .filter(|a| market.price_of(a).is_none())
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "Market data incomplete");
        }
        Ok(market)
    }

    #[instrument(skip_all, fields(trader = %trader.id))]
    async fn run_trader(
        &self,
        trader: &Trader,
        market: &MarketData,
        settings: &SchedulerSettings,
        started_at: DateTime<Utc>,
    ) -> Result<TraderOutcome> {
        let positions = self
            .inner
            .store
            .list_active_positions(Some(&trader.id))
            .await?;
        let trades = self.inner.store.list_trades(&trader.id).await?;
        let model = settings.selected_models.get(&trader.strategy).cloned();
        let ctx = DecisionContext {
            trader_id: trader.id.clone(),
            trader_name: trader.name.clone(),
            model: model.clone(),
            assets: settings.assets.clone(),
            market: market.clone(),
            portfolio: PortfolioState::from_ledger(trader, positions).with_trade_history(&trades),
            cycle_started_at: started_at,
        };

        let (raw, invoked) = match self.inner.providers.create(&trader.strategy, model.as_deref()) {
            Some(provider) => (self.invoke(provider, &ctx, settings.provider_timeout).await, true),
            None => (
                RawDecision::hold_on_failure(format!(
                    "no provider registered for strategy '{}'",
                    trader.strategy
                )),
                false,
            ),
        };

        let action = raw.validate();
        let reasoning = match &action {
            TradeAction::Hold {
                rejected: Some(reason),
            } => {
                warn!(%reason, "Rejected malformed decision");
                format!("{} [rejected: {}]", raw.reasoning, reason)
            }
            _ => raw.reasoning.clone(),
        };

        let record = DecisionRecord {
            id: Uuid::new_v4(),
            trader_id: trader.id.clone(),
            action: action.kind(),
            asset: action.asset().map(str::to_string).or_else(|| raw.asset.clone()),
            amount: raw.amount,
            reasoning,
            confidence: raw.confidence,
            exit_plan: raw.exit_plan(),
            risk_usd: raw.risk_usd,
            executed: false,
            usage: raw.usage.clone(),
            model,
            created_at: Utc::now(),
        };
        self.inner.store.insert_decision(&record).await?;

        if invoked {
            self.charge_usage(&trader.id, raw.usage.as_ref()).await?;
        }

        let mut outcome = TraderOutcome {
            trader_id: trader.id.clone(),
            action: record.action,
            executed: false,
            error: None,
        };

        let execution = match action {
            TradeAction::Hold { .. } => return Ok(outcome),
            TradeAction::Buy {
                asset,
                investment,
                exit_plan,
            } => match market.price_of(&asset) {
                Some(price) => self
                    .inner
                    .executor
                    .execute_buy(BuyOrder {
                        trader_id: trader.id.clone(),
                        asset,
                        investment,
                        price,
                        reasoning: raw.reasoning.clone(),
                        exit_plan,
                    })
                    .await
                    .map(|_| ()),
                None => Err(EngineError::PriceUnavailable(asset)),
            },
            TradeAction::Sell { asset, quantity } => match market.price_of(&asset) {
                Some(price) => self
                    .inner
                    .executor
                    .execute_sell(SellOrder {
                        trader_id: trader.id.clone(),
                        asset,
                        quantity,
                        price,
                        reasoning: raw.reasoning.clone(),
                    })
                    .await
                    .map(|_| ()),
                None => Err(EngineError::PriceUnavailable(asset)),
            },
        };

        match execution {
            Ok(()) => {
                // The trade is on the ledger either way
                if let Err(e) = self.inner.store.mark_decision_executed(record.id).await {
                    warn!(decision = %record.id, error = %e, "Failed to flag decision as executed");
                }
                outcome.executed = true;
            }
            Err(e) => {
                if e.is_validation() {
                    warn!(action = %record.action, error = %e, "Decision not executed");
                } else {
                    error!(action = %record.action, error = %e, "Execution failed");
                }
                outcome.error = Some(e.to_string());
            }
        }
        Ok(outcome)
    }

    /// Call a provider, turning every failure into a HOLD
    async fn invoke(
        &self,
        provider: SharedProvider,
        ctx: &DecisionContext,
        limit: Duration,
    ) -> RawDecision {
        match timeout(limit, provider.make_decision(ctx)).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                warn!(provider = provider.name(), error = %e, "Decision provider failed");
                RawDecision::hold_on_failure(e)
            }
            Err(_) => {
                let e = EngineError::Timeout(format!("decision provider exceeded {:?}", limit));
                warn!(provider = provider.name(), error = %e, "Decision provider timed out");
                RawDecision::hold_on_failure(e)
            }
        }
    }

    /// Count the call and apply reported usage cost per the cost toggles
    async fn charge_usage(&self, trader_id: &str, usage: Option<&Usage>) -> Result<()> {
        let cfg = self.inner.costs.current().await;
        let mut trader = self
            .inner
            .store
            .get_trader(trader_id)
            .await?
            .ok_or_else(|| EngineError::TraderNotFound(trader_id.to_string()))?;

        trader.api_calls = trader.api_calls.saturating_add(1);
        let cost = usage.map_or(Decimal::ZERO, |u| u.cost_usd);
        if cost > Decimal::ZERO {
            let overflow = || {
                EngineError::Provider(format!("usage cost {} overflows the ledger", cost))
            };
            trader.api_costs = trader.api_costs.checked_add(cost).ok_or_else(overflow)?;
            if cfg.deduct_api_costs {
                trader.balance = trader.balance.checked_sub(cost).ok_or_else(overflow)?;
            }
            if cfg.include_costs_in_pnl {
                trader.total_pnl = trader.total_pnl.checked_sub(cost).ok_or_else(overflow)?;
            }
            debug!(%cost, balance = %trader.balance, "Charged provider usage");
        }
        self.inner.store.update_trader(&trader).await
    }
}
