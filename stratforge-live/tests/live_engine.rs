//! Live engine lifecycle, execution modes and backtest parity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use stratforge_core::components::indicator::IndicatorValues;
use stratforge_core::components::{
    FilterChain, FilterContext, Strategy, StrategyDescriptor, StrategyRegistry,
};
use stratforge_core::domain::{
    Bar, ExitReason, Fill, OrderRequest, OrderSide, ParamSchema, ParamSpec, ParameterSet, Side,
    TradeSignal,
};
use stratforge_core::engine::{run_filtered, BacktestConfig};
use stratforge_core::error::{ConfigError, DataError, StrategyFault};
use stratforge_live::{
    compare_with_backtest, ChannelFeed, EngineState, ExecutionFault, LiveConfig, LiveEngine,
    LiveError, LiveEvent, LiveHandle, LiveStatus, OrderExecutor, ReplayFeed, TradingMode,
    DEFAULT_TOLERANCE_PCT,
};

// ─── Fixtures ────────────────────────────────────────────────────────

/// BUY on every odd multiple of `period`, SELL on every even one.
struct Alternating {
    period: usize,
    params: ParameterSet,
}

impl Strategy for Alternating {
    fn name(&self) -> &str {
        "alternating"
    }

    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn default_params(&self) -> ParameterSet {
        alternating_defaults()
    }

    fn param_schema(&self) -> ParamSchema {
        alternating_schema()
    }

    fn required_history(&self) -> usize {
        1
    }

    fn precompute(&self, _bars: &[Bar]) -> IndicatorValues {
        IndicatorValues::new()
    }

    fn analyze(
        &self,
        _bars: &[Bar],
        index: usize,
        _indicators: &IndicatorValues,
    ) -> Result<TradeSignal, StrategyFault> {
        if index % self.period != 0 {
            return Ok(TradeSignal::hold());
        }
        Ok(if (index / self.period) % 2 == 1 {
            TradeSignal::buy(1.0)
        } else {
            TradeSignal::sell(1.0)
        })
    }
}

fn alternating_defaults() -> ParameterSet {
    ParameterSet::new().with("period", 10_i64)
}

fn alternating_schema() -> ParamSchema {
    ParamSchema::new().with("period", ParamSpec::int(2, 50, "bars between signals"))
}

fn build_alternating(params: &ParameterSet) -> Result<Box<dyn Strategy>, ConfigError> {
    Ok(Box::new(Alternating {
        period: params.usize("period")?,
        params: params.clone(),
    }))
}

fn alternating() -> StrategyDescriptor {
    StrategyDescriptor {
        name: "alternating",
        description: "flip between BUY and SELL every few bars",
        default_params: alternating_defaults,
        param_schema: alternating_schema,
        build: build_alternating,
    }
}

fn t(i: usize) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(i as i64)
}

fn wave_bars(n: usize) -> Vec<Bar> {
    let mut prev = 100.0;
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 + 0.03 * x + 6.0 * (x * 0.15).sin();
            let open = prev;
            prev = close;
            Bar::new(t(i), open, open.max(close) * 1.002, open.min(close) * 0.998, close, 500.0)
        })
        .collect()
}

fn flat_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| Bar::new(t(i), 100.0, 100.5, 99.5, 100.0, 500.0))
        .collect()
}

fn engine(mode: TradingMode) -> LiveEngine {
    let config = LiveConfig {
        mode,
        ..LiveConfig::paper("TEST/USD", BacktestConfig::default())
    };
    let strategy = alternating().instantiate(&ParameterSet::new()).unwrap();
    LiveEngine::new(strategy, FilterChain::new(), FilterContext::new(), config)
}

async fn wait_until(handle: &LiveHandle, done: impl Fn(&LiveStatus) -> bool) {
    for _ in 0..2_000 {
        if done(&handle.status()) {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(1)).await;
    }
    panic!("condition not reached: {:?}", handle.status());
}

/// Fills every order at a fixed price with no fee.
struct FixedPriceExecutor {
    price: f64,
    submitted: AtomicUsize,
}

#[async_trait]
impl OrderExecutor for FixedPriceExecutor {
    async fn submit(&self, order: &OrderRequest) -> Result<Fill, ExecutionFault> {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(Fill {
            timestamp: t(0) + Duration::seconds(n as i64),
            side: order.side,
            price: self.price,
            size: order.size,
            fee: 0.0,
        })
    }
}

struct RejectingExecutor;

#[async_trait]
impl OrderExecutor for RejectingExecutor {
    async fn submit(&self, _order: &OrderRequest) -> Result<Fill, ExecutionFault> {
        Err(ExecutionFault::Rejected("insufficient margin".into()))
    }
}

/// Fills buys in full but only half of every sell.
struct HalfSellExecutor;

#[async_trait]
impl OrderExecutor for HalfSellExecutor {
    async fn submit(&self, order: &OrderRequest) -> Result<Fill, ExecutionFault> {
        let size = match order.side {
            OrderSide::Buy => order.size,
            OrderSide::Sell => order.size / 2.0,
        };
        Ok(Fill {
            timestamp: t(0),
            side: order.side,
            price: 100.0,
            size,
            fee: 0.0,
        })
    }
}

// ─── Parity ──────────────────────────────────────────────────────────

#[tokio::test]
async fn alternating_fixture_matches_backtest() {
    let bars = wave_bars(200);
    let report = compare_with_backtest(
        &alternating(),
        &ParameterSet::new(),
        &[],
        &FilterContext::new(),
        &bars,
        &BacktestConfig::default(),
        DEFAULT_TOLERANCE_PCT,
    )
    .await
    .unwrap();
    assert!(report.backtest_trades > 5);
    assert_eq!(report.trades_diff, 0);
    assert!(report.return_diff_pct <= DEFAULT_TOLERANCE_PCT);
    assert!(report.matches, "{report:?}");

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["matches"], true);
    assert_eq!(json["trades_diff"], 0);
}

#[tokio::test]
async fn builtin_crossover_matches_backtest() {
    let registry = StrategyRegistry::with_builtins();
    let descriptor = registry.get("ma_crossover").unwrap();
    let params = ParameterSet::new()
        .with("fast_period", 5_i64)
        .with("slow_period", 20_i64);
    let report = compare_with_backtest(
        descriptor,
        &params,
        &[],
        &FilterContext::new(),
        &wave_bars(300),
        &BacktestConfig::default(),
        DEFAULT_TOLERANCE_PCT,
    )
    .await
    .unwrap();
    assert!(report.backtest_trades > 0);
    assert!(report.matches, "{report:?}");
}

#[tokio::test]
async fn paper_session_reproduces_backtest_trades() {
    let bars = wave_bars(150);
    let config = BacktestConfig::default();
    let strategy = alternating().instantiate(&ParameterSet::new()).unwrap();
    let backtest = run_filtered(
        strategy.as_ref(),
        &FilterChain::new(),
        &FilterContext::new(),
        &bars,
        &config,
    )
    .unwrap();

    let mut engine = engine(TradingMode::Paper);
    engine.start(&mut ReplayFeed::new(bars.clone())).await.unwrap();
    let session = engine.session_result();
    assert_eq!(session.trades, backtest.trades);
    assert_eq!(session.equity_curve.len(), bars.len());
    assert!((session.final_capital - backtest.final_capital).abs() < 1e-9);
    assert_eq!(session.trades.last().unwrap().exit_reason, backtest.trades.last().unwrap().exit_reason);
    assert_eq!(engine.state(), EngineState::Stopped);

    let summary = engine.summary();
    assert_eq!(summary.total_trades, session.trades.len());
}

#[tokio::test]
async fn sma_crossover_survives_a_trimmed_window() {
    // SMA columns only look back a fixed span, so a window just past the
    // warmup still reproduces the backtest's decisions.
    let registry = StrategyRegistry::with_builtins();
    let params = ParameterSet::new()
        .with("fast_period", 5_i64)
        .with("slow_period", 20_i64)
        .with("ma_type", "sma");
    let build = || registry.create("ma_crossover", &params).unwrap();
    let bars = wave_bars(300);
    let config = BacktestConfig::default();
    let backtest = run_filtered(
        build().as_ref(),
        &FilterChain::new(),
        &FilterContext::new(),
        &bars,
        &config,
    )
    .unwrap();

    let live_config = LiveConfig {
        max_history: 30,
        ..LiveConfig::paper("TEST/USD", config)
    };
    let mut engine = LiveEngine::new(build(), FilterChain::new(), FilterContext::new(), live_config);
    engine.start(&mut ReplayFeed::new(bars.clone())).await.unwrap();
    let session = engine.session_result();
    assert!(backtest.trades.len() > 2);
    assert_eq!(session.trades.len(), backtest.trades.len());
    assert!((session.final_capital - backtest.final_capital).abs() < 1e-6);
}

// ─── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn stalled_feed_then_stop() {
    let mut engine = engine(TradingMode::Paper);
    let handle = engine.handle();
    let (tx, mut feed) = ChannelFeed::channel(16);
    let task = tokio::spawn(async move {
        let outcome = engine.start(&mut feed).await;
        (engine, outcome)
    });

    for bar in wave_bars(25) {
        tx.send(bar).await.unwrap();
    }
    wait_until(&handle, |s| s.bars_processed == 25).await;
    assert_eq!(handle.state(), EngineState::Running);
    let trades_before = handle.trades();
    assert!(!trades_before.is_empty());

    // Nothing more arrives: the engine keeps waiting until asked to stop.
    tokio::time::sleep(StdDuration::from_millis(20)).await;
    assert_eq!(handle.state(), EngineState::Running);

    handle.stop();
    handle.stop();
    let (engine, outcome) = task.await.unwrap();
    outcome.unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(handle.trades(), trades_before);
    handle.stop();
    assert_eq!(handle.state(), EngineState::Stopped);
    drop(tx);
}

#[tokio::test]
async fn stop_before_start_is_terminal() {
    let mut engine = engine(TradingMode::Paper);
    let handle = engine.handle();
    handle.stop();
    assert_eq!(handle.state(), EngineState::Stopped);
    let err = engine
        .start(&mut ReplayFeed::new(wave_bars(10)))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LiveError::InvalidTransition {
            from: EngineState::Stopped,
            to: EngineState::Running
        }
    ));
}

#[tokio::test]
async fn second_start_is_rejected() {
    let mut engine = engine(TradingMode::Paper);
    let (_tx, mut feed) = ChannelFeed::channel(4);
    // Abandon a session that is waiting on an empty feed.
    let pending = tokio::time::timeout(StdDuration::from_millis(10), engine.start(&mut feed)).await;
    assert!(pending.is_err());
    assert_eq!(engine.state(), EngineState::Running);

    let err = engine.start(&mut feed).await.unwrap_err();
    assert!(matches!(err, LiveError::AlreadyRunning));

    let mut finished = self::engine(TradingMode::Paper);
    finished.start(&mut ReplayFeed::new(wave_bars(5))).await.unwrap();
    let err = finished
        .start(&mut ReplayFeed::new(wave_bars(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveError::InvalidTransition { from: EngineState::Stopped, .. }));
}

#[tokio::test]
async fn out_of_order_bar_moves_to_error() {
    let mut engine = engine(TradingMode::Paper);
    let handle = engine.handle();
    let mut bars = wave_bars(30);
    let repeated = bars[28].clone();
    bars[29] = repeated;

    let err = engine.start(&mut ReplayFeed::new(bars)).await.unwrap_err();
    assert!(matches!(
        err,
        LiveError::Data(DataError::NonMonotonic { index: 29, .. })
    ));
    assert_eq!(handle.state(), EngineState::Error);
    let status = handle.status();
    assert_eq!(status.bars_processed, 29);
    assert_eq!(status.trades_count, handle.trades().len());
}

// ─── Execution modes ─────────────────────────────────────────────────

#[tokio::test]
async fn dry_run_never_touches_the_ledger() {
    let mut engine = engine(TradingMode::DryRun);
    let handle = engine.handle();
    let mut events = handle.subscribe();
    engine.start(&mut ReplayFeed::new(wave_bars(80))).await.unwrap();

    let status = handle.status();
    assert_eq!(status.trades_count, 0);
    assert!(status.position.is_none());
    assert_eq!(status.cash, BacktestConfig::default().initial_capital);
    assert_eq!(status.session_pnl, 0.0);

    let mut signals = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, LiveEvent::Signal { .. }) {
            signals += 1;
        }
        assert!(!matches!(event, LiveEvent::PositionOpened { .. }));
    }
    assert!(signals > 0);
}

#[tokio::test]
async fn live_mode_applies_confirmed_fills() {
    let executor = Arc::new(FixedPriceExecutor {
        price: 100.0,
        submitted: AtomicUsize::new(0),
    });
    let mut engine = engine(TradingMode::Live).with_executor(executor.clone());
    let handle = engine.handle();
    engine.start(&mut ReplayFeed::new(flat_bars(60))).await.unwrap();

    let trades = handle.trades();
    assert!(!trades.is_empty());
    assert_eq!(executor.submitted.load(Ordering::SeqCst), trades.len() * 2);
    for trade in &trades {
        assert_eq!(trade.entry_price, 100.0);
        assert_eq!(trade.exit_price, 100.0);
        assert_eq!(trade.pnl, 0.0);
    }
    assert!(handle.status().position.is_none());
    assert!((handle.balance().cash - BacktestConfig::default().initial_capital).abs() < 1e-6);
}

#[tokio::test]
async fn rejected_orders_leave_ledger_consistent() {
    let mut engine = engine(TradingMode::Live).with_executor(Arc::new(RejectingExecutor));
    let handle = engine.handle();
    let mut events = handle.subscribe();
    engine.start(&mut ReplayFeed::new(wave_bars(60))).await.unwrap();

    let status = handle.status();
    assert_eq!(status.state, EngineState::Stopped);
    assert!(status.execution_faults > 0);
    assert!(status.position.is_none());
    assert_eq!(status.trades_count, 0);
    assert_eq!(handle.balance().cash, BacktestConfig::default().initial_capital);
    assert_eq!(handle.balance().total_fees, 0.0);

    let mut faults = 0;
    while let Ok(event) = events.try_recv() {
        if let LiveEvent::ExecutionFault { message, .. } = event {
            assert!(message.contains("insufficient margin"));
            faults += 1;
        }
    }
    assert_eq!(faults, status.execution_faults);
}

#[tokio::test]
async fn partial_exit_fill_keeps_position_open() {
    let mut engine = engine(TradingMode::Live).with_executor(Arc::new(HalfSellExecutor));
    let handle = engine.handle();
    engine.start(&mut ReplayFeed::new(flat_bars(25))).await.unwrap();

    let status = handle.status();
    let position = status.position.expect("long entry was filled in full");
    assert_eq!(position.side, Side::Long);
    assert_eq!(status.trades_count, 0);
    assert!(status.execution_faults >= 1);

    // Cash reflects only the entry; no sale proceeds were credited.
    let balance = handle.balance();
    assert!((balance.cash - (10_000.0 - 100.0 * position.size)).abs() < 1e-6);
    assert!(engine.ledger().trades().is_empty());
}

#[tokio::test]
async fn live_mode_requires_an_executor() {
    let mut engine = engine(TradingMode::Live);
    let err = engine
        .start(&mut ReplayFeed::new(wave_bars(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, LiveError::Config(ConfigError::InvalidSetting { field: "executor", .. })));
    assert_eq!(engine.state(), EngineState::Initializing);
}

#[tokio::test]
async fn flatten_on_stop_closes_open_position() {
    let config = LiveConfig {
        flatten_on_stop: true,
        ..LiveConfig::paper("TEST/USD", BacktestConfig::default())
    };
    let strategy = alternating().instantiate(&ParameterSet::new()).unwrap();
    let mut engine = LiveEngine::new(strategy, FilterChain::new(), FilterContext::new(), config);
    let handle = engine.handle();
    let (tx, mut feed) = ChannelFeed::channel(32);
    // Long opened at bar 10 and still open after bar 14.
    for bar in wave_bars(15) {
        tx.send(bar).await.unwrap();
    }
    drop(tx);

    engine.start(&mut feed).await.unwrap();
    let trades = handle.trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].exit_reason, ExitReason::EndOfData);
    assert_eq!(trades[0].exit_index, 14);
    assert!(handle.status().position.is_none());
    let last_equity = engine.session_result().equity_curve.last().unwrap().equity;
    assert!((last_equity - handle.balance().cash).abs() < 1e-9);
}
