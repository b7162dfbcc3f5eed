//! Live engine — the backtest decision path driven by an external bar feed.
//!
//! Per incoming bar:
//! 1. Validate against the previous bar (a DataFault moves the engine to ERROR)
//! 2. Signal: `SignalPipeline` over the rolling history
//! 3. Decision: `plan_bar`, identical to the backtest loop
//! 4. Fill: simulated (paper), submitted to the `OrderExecutor` (live) or
//!    only logged (dry run)
//! 5. Equity point and snapshot for the handle
//!
//! The engine waits on the feed and on order confirmations; a stop request
//! is honored at the next wait for a bar. An order already in flight is
//! awaited to completion first so its fill is never lost.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratforge_core::components::{FilterChain, FilterContext, Strategy};
use stratforge_core::domain::{
    validate_bar, validate_next, Bar, EquityPoint, ExitReason, Fill, OrderRequest, OrderSide,
    RunResult, Side,
};
use stratforge_core::engine::{plan_bar, BacktestConfig, BarAction, FaultTracker, Ledger, SignalPipeline};
use stratforge_core::error::{ConfigError, DataError};
use stratforge_runner::Metrics;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutionFault, LiveError};
use crate::executor::OrderExecutor;
use crate::feed::BarFeed;
use crate::handle::{Balance, LiveEvent, LiveHandle, LiveStatus, Shared, Snapshot};
use crate::state::{EngineState, TradingMode};

/// Relative difference between ordered and filled size still booked as a full fill.
const FILL_SIZE_TOLERANCE: f64 = 1e-9;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub symbol: String,
    pub mode: TradingMode,
    /// Capital, sizing and the cost model used for paper fills.
    pub backtest: BacktestConfig,
    /// Bars kept for signal evaluation. Must exceed the strategy's warmup.
    ///
    /// Indicators are recomputed over the retained window on every bar. Once
    /// the window is full, recursive indicators (EMA, Wilder RSI/ATR, ADX) are
    /// seeded from a later bar than a backtest over the whole series would
    /// use, so their values can drift slightly from the backtest's. Keep this
    /// several times larger than the longest recursive period when exact
    /// backtest agreement matters.
    pub max_history: usize,
    /// Close any open position when the session stops.
    pub flatten_on_stop: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            symbol: "BTC/USDT".to_string(),
            mode: TradingMode::Paper,
            backtest: BacktestConfig::default(),
            max_history: 1_000,
            flatten_on_stop: false,
        }
    }
}

impl LiveConfig {
    pub fn paper(symbol: impl Into<String>, backtest: BacktestConfig) -> Self {
        Self {
            symbol: symbol.into(),
            backtest,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backtest.validate()?;
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::setting("symbol", "must not be empty"));
        }
        if self.max_history < 2 {
            return Err(ConfigError::setting(
                "max_history",
                format!("must be at least 2, got {}", self.max_history),
            ));
        }
        Ok(())
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

pub struct LiveEngine {
    strategy: Box<dyn Strategy>,
    chain: FilterChain,
    context: FilterContext,
    config: LiveConfig,
    executor: Option<Arc<dyn OrderExecutor>>,
    ledger: Ledger,
    faults: FaultTracker,
    history: Vec<Bar>,
    equity_curve: Vec<EquityPoint>,
    bars_processed: usize,
    execution_faults: usize,
    shared: Arc<Shared>,
    stop_rx: watch::Receiver<bool>,
}

impl LiveEngine {
    pub fn new(
        strategy: Box<dyn Strategy>,
        chain: FilterChain,
        context: FilterContext,
        config: LiveConfig,
    ) -> Self {
        let ledger = Ledger::new(&config.backtest);
        let faults = FaultTracker::new(config.backtest.fault_threshold);
        let snapshot = Snapshot {
            status: LiveStatus {
                state: EngineState::Initializing,
                mode: config.mode,
                symbol: config.symbol.clone(),
                position: None,
                cash: ledger.cash(),
                equity: ledger.cash(),
                session_pnl: 0.0,
                trades_count: 0,
                health: faults.health(),
                last_bar: None,
                bars_processed: 0,
                execution_faults: 0,
            },
            balance: Balance {
                initial_capital: ledger.initial_capital(),
                cash: ledger.cash(),
                equity: ledger.cash(),
                position_value: 0.0,
                total_fees: 0.0,
            },
            trades: Vec::new(),
        };
        let (shared, stop_rx) = Shared::new(snapshot);
        Self {
            strategy,
            chain,
            context,
            config,
            executor: None,
            ledger,
            faults,
            history: Vec::new(),
            equity_curve: Vec::new(),
            bars_processed: 0,
            execution_faults: 0,
            shared,
            stop_rx,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn OrderExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn handle(&self) -> LiveHandle {
        LiveHandle::new(Arc::clone(&self.shared))
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run the session until the feed closes, a stop is requested or a
    /// data fault occurs.
    ///
    /// Only an INITIALIZING engine can start; the engine ends STOPPED, or
    /// ERROR when an error is returned after the session began.
    pub async fn start(&mut self, feed: &mut dyn BarFeed) -> Result<(), LiveError> {
        match self.shared.state() {
            EngineState::Initializing => {}
            EngineState::Running => return Err(LiveError::AlreadyRunning),
            from => {
                return Err(LiveError::InvalidTransition {
                    from,
                    to: EngineState::Running,
                })
            }
        }
        self.check_setup()?;
        self.shared
            .transition(EngineState::Running)
            .map_err(|from| match from {
                EngineState::Running => LiveError::AlreadyRunning,
                from => LiveError::InvalidTransition {
                    from,
                    to: EngineState::Running,
                },
            })?;
        info!(
            strategy = self.strategy.name(),
            symbol = %self.config.symbol,
            mode = ?self.config.mode,
            filters = self.chain.len(),
            "live session started"
        );

        let outcome = self.run_loop(feed).await;
        match outcome {
            Ok(()) => {
                if self.config.flatten_on_stop {
                    self.flatten().await;
                }
                self.publish();
                let _ = self.shared.transition(EngineState::Stopped);
                info!(
                    strategy = self.strategy.name(),
                    bars = self.bars_processed,
                    trades = self.ledger.trades().len(),
                    equity = self.current_equity(),
                    "live session stopped"
                );
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "live session failed");
                self.publish();
                let _ = self.shared.transition(EngineState::Error);
                Err(err)
            }
        }
    }

    fn check_setup(&self) -> Result<(), LiveError> {
        self.config.validate()?;
        if self.config.mode == TradingMode::Live && self.executor.is_none() {
            return Err(ConfigError::setting("executor", "live mode requires an order executor").into());
        }
        let warmup = self.strategy.required_history().max(self.chain.required_history());
        if self.config.max_history <= warmup {
            return Err(ConfigError::setting(
                "max_history",
                format!(
                    "{} bars cannot cover a warmup of {warmup}",
                    self.config.max_history
                ),
            )
            .into());
        }
        Ok(())
    }

    async fn run_loop(&mut self, feed: &mut dyn BarFeed) -> Result<(), LiveError> {
        let mut stop_rx = self.stop_rx.clone();
        loop {
            if *stop_rx.borrow() {
                info!("stop requested");
                return Ok(());
            }
            let next = tokio::select! {
                biased;
                _ = stop_rx.wait_for(|stop| *stop) => {
                    info!("stop requested");
                    return Ok(());
                }
                bar = feed.next_bar() => bar,
            };
            let Some(bar) = next else {
                info!(bars = self.bars_processed, "bar feed closed");
                return Ok(());
            };
            let is_last = feed.is_exhausted();
            self.on_bar(bar, is_last).await?;
        }
    }

    async fn on_bar(&mut self, bar: Bar, is_last: bool) -> Result<(), LiveError> {
        let index = self.bars_processed;
        self.validate_incoming(index, &bar)?;

        self.history.push(bar);
        if self.history.len() > self.config.max_history {
            let excess = self.history.len() - self.config.max_history;
            self.history.drain(..excess);
        }
        let local = self.history.len() - 1;

        let signal = {
            let mut pipeline = SignalPipeline::new(self.strategy.as_ref(), &self.chain, &self.context);
            if let Err(fault) = pipeline.prepare(&self.history) {
                self.faults.record(&fault);
            }
            pipeline.signal_at(&self.history, local, &mut self.faults)
        };
        let bar = self.history[local].clone();
        if signal.is_actionable() {
            debug!(bar = index, signal = ?signal.signal, strength = signal.strength, "signal");
            self.shared.emit(LiveEvent::Signal {
                bar_index: index,
                signal: signal.signal,
            });
        }

        let action = plan_bar(
            self.ledger.position(),
            &bar,
            index,
            &signal,
            self.config.backtest.allow_short,
            is_last,
        );
        self.execute(action, &bar, index).await;

        self.bars_processed += 1;
        self.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: self.ledger.equity(bar.close),
        });
        self.publish();
        Ok(())
    }

    fn validate_incoming(&self, index: usize, bar: &Bar) -> Result<(), DataError> {
        match self.history.last() {
            Some(previous) => validate_next(index, previous, bar),
            None => validate_bar(index, bar),
        }
    }

    async fn execute(&mut self, action: BarAction, bar: &Bar, index: usize) {
        match action {
            BarAction::None => {}
            BarAction::Open {
                side,
                price,
                stop_loss,
                take_profit,
            } => {
                let Some(fill) = self.fill_entry(side, price, bar.timestamp, index).await else {
                    return;
                };
                if let Some(position) = self.ledger.open(side, &fill, index, stop_loss, take_profit) {
                    let position = position.clone();
                    info!(
                        bar = index,
                        ?side,
                        price = fill.price,
                        size = fill.size,
                        "position opened"
                    );
                    self.shared.emit(LiveEvent::PositionOpened { position });
                }
            }
            BarAction::Close { reason, price } => {
                self.close_position(reason, price, bar.timestamp, index).await;
            }
        }
    }

    async fn close_position(
        &mut self,
        reason: ExitReason,
        price: f64,
        timestamp: DateTime<Utc>,
        index: usize,
    ) {
        let Some(fill) = self.fill_exit(price, timestamp, index).await else {
            return;
        };
        if let Some(trade) = self.ledger.close(&fill, index, reason) {
            info!(
                bar = index,
                ?reason,
                price = trade.exit_price,
                pnl = trade.pnl,
                "position closed"
            );
            self.shared.emit(LiveEvent::TradeClosed { trade });
        }
    }

    async fn fill_entry(
        &mut self,
        side: Side,
        price: f64,
        timestamp: DateTime<Utc>,
        index: usize,
    ) -> Option<Fill> {
        let simulated = self.ledger.simulate_entry(side, price, timestamp)?;
        match self.config.mode {
            TradingMode::Paper => Some(simulated),
            TradingMode::DryRun => {
                info!(bar = index, ?side, price, size = simulated.size, "dry run: would open");
                None
            }
            TradingMode::Live => {
                let order = OrderRequest::market(
                    self.config.symbol.clone(),
                    OrderSide::entering(side),
                    simulated.size,
                );
                self.submit(&order, index).await
            }
        }
    }

    async fn fill_exit(&mut self, price: f64, timestamp: DateTime<Utc>, index: usize) -> Option<Fill> {
        let simulated = self.ledger.simulate_exit(price, timestamp)?;
        match self.config.mode {
            TradingMode::Paper => Some(simulated),
            TradingMode::DryRun => {
                info!(bar = index, price, size = simulated.size, "dry run: would close");
                None
            }
            TradingMode::Live => {
                let order = OrderRequest::market(self.config.symbol.clone(), simulated.side, simulated.size);
                self.submit(&order, index).await
            }
        }
    }

    /// Submit and wait. A fault leaves the ledger untouched and the session running.
    async fn submit(&mut self, order: &OrderRequest, index: usize) -> Option<Fill> {
        let executor = Arc::clone(self.executor.as_ref()?);
        let result = executor.submit(order).await.and_then(|fill| {
            if fill.side != order.side {
                return Err(ExecutionFault::InvalidFill(format!(
                    "expected a {} fill, got {}",
                    order.side, fill.side
                )));
            }
            if !fill.is_valid() {
                return Err(ExecutionFault::InvalidFill(format!(
                    "price {} size {} fee {}",
                    fill.price, fill.size, fill.fee
                )));
            }
            // Partial fills are not booked; the position stays as it was.
            if (fill.size - order.size).abs() > FILL_SIZE_TOLERANCE * order.size.abs().max(1.0) {
                return Err(ExecutionFault::InvalidFill(format!(
                    "filled {} of {} ordered",
                    fill.size, order.size
                )));
            }
            Ok(fill)
        });
        match result {
            Ok(fill) => Some(fill),
            Err(fault) => {
                self.execution_faults += 1;
                error!(
                    bar = index,
                    side = %order.side,
                    size = order.size,
                    error = %fault,
                    "order submission failed, ledger unchanged"
                );
                self.shared.emit(LiveEvent::ExecutionFault {
                    bar_index: index,
                    message: fault.to_string(),
                });
                None
            }
        }
    }

    async fn flatten(&mut self) {
        let Some(bar) = self.history.last().cloned() else {
            return;
        };
        if self.ledger.is_flat() {
            return;
        }
        warn!(price = bar.close, "flattening open position on stop");
        let index = self.bars_processed.saturating_sub(1);
        self.close_position(ExitReason::EndOfData, bar.close, bar.timestamp, index)
            .await;
        if let Some(point) = self.equity_curve.last_mut() {
            point.equity = self.ledger.equity(bar.close);
        }
    }

    fn current_equity(&self) -> f64 {
        match self.history.last() {
            Some(bar) => self.ledger.equity(bar.close),
            None => self.ledger.cash(),
        }
    }

    fn publish(&self) {
        let equity = self.current_equity();
        let position_value = equity - self.ledger.cash();
        let mut snapshot = self.shared.lock();
        let status = &mut snapshot.status;
        status.position = self.ledger.position().cloned();
        status.cash = self.ledger.cash();
        status.equity = equity;
        status.session_pnl = equity - self.ledger.initial_capital();
        status.trades_count = self.ledger.trades().len();
        status.health = self.faults.health();
        status.last_bar = self.history.last().map(|b| b.timestamp);
        status.bars_processed = self.bars_processed;
        status.execution_faults = self.execution_faults;
        snapshot.balance = Balance {
            initial_capital: self.ledger.initial_capital(),
            cash: self.ledger.cash(),
            equity,
            position_value,
            total_fees: self.ledger.total_fees(),
        };
        if snapshot.trades.len() != self.ledger.trades().len() {
            snapshot.trades = self.ledger.trades().to_vec();
        }
    }

    /// The session so far as a `RunResult`. An open position is marked at
    /// the last close.
    pub fn session_result(&self) -> RunResult {
        RunResult {
            strategy: self.strategy.name().to_string(),
            params: self.strategy.params().clone(),
            initial_capital: self.ledger.initial_capital(),
            final_capital: self.current_equity(),
            equity_curve: self.equity_curve.clone(),
            trades: self.ledger.trades().to_vec(),
            total_fees: self.ledger.total_fees(),
            faults: self.faults.summary(),
        }
    }

    /// Performance metrics over the session equity curve.
    pub fn summary(&self) -> Metrics {
        Metrics::compute(&self.session_result(), self.config.backtest.periods_per_year)
    }
}

impl std::fmt::Debug for LiveEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveEngine")
            .field("strategy", &self.strategy.name())
            .field("symbol", &self.config.symbol)
            .field("mode", &self.config.mode)
            .field("state", &self.shared.state())
            .field("bars_processed", &self.bars_processed)
            .finish()
    }
}
