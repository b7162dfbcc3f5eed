//! Bar-by-bar backtest loop.
//!
//! One deterministic pass over a validated series. Per bar:
//! 1. Signal: strategy + filter chain (HOLD during warmup or on a fault)
//! 2. Decision: `plan_bar` (stop, target, opposite signal, end of data, entry)
//! 3. Fill: simulated locally with the cost model and applied to the ledger
//! 4. Equity: cash plus mark-to-market at the close, one point per bar

use tracing::{debug, info};

use crate::components::chain::FilterChain;
use crate::components::filter::FilterContext;
use crate::components::strategy::Strategy;
use crate::domain::{validate_series, Bar, EquityPoint, RunResult};
use crate::error::EngineError;

use super::config::BacktestConfig;
use super::ledger::Ledger;
use super::pipeline::{FaultTracker, SignalPipeline};
use super::step::{plan_bar, BarAction};

/// Run `strategy` over `bars` with no filters.
pub fn run_backtest(
    strategy: &dyn Strategy,
    bars: &[Bar],
    config: &BacktestConfig,
) -> Result<RunResult, EngineError> {
    run_filtered(strategy, &FilterChain::new(), &FilterContext::new(), bars, config)
}

/// Run `strategy` wrapped in `chain` over `bars`.
///
/// The configuration and the series are validated before the first bar;
/// either failing rejects the run.
pub fn run_filtered(
    strategy: &dyn Strategy,
    chain: &FilterChain,
    context: &FilterContext,
    bars: &[Bar],
    config: &BacktestConfig,
) -> Result<RunResult, EngineError> {
    config.validate()?;
    validate_series(bars)?;

    let mut pipeline = SignalPipeline::new(strategy, chain, context);
    let mut faults = FaultTracker::new(config.fault_threshold);
    if let Err(fault) = pipeline.prepare(bars) {
        faults.record(&fault);
    }
    info!(
        strategy = strategy.name(),
        bars = bars.len(),
        filters = chain.len(),
        warmup = pipeline.required_history(),
        "backtest started"
    );

    let mut ledger = Ledger::new(config);
    let mut equity_curve = Vec::with_capacity(bars.len());
    let last = bars.len() - 1;

    for (i, bar) in bars.iter().enumerate() {
        let signal = pipeline.signal_at(bars, i, &mut faults);
        let action = plan_bar(
            ledger.position(),
            bar,
            i,
            &signal,
            config.allow_short,
            i == last,
        );
        apply_action(&mut ledger, action, bar, i);
        equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: ledger.equity(bar.close),
        });
    }

    let final_capital = ledger.cash();
    let total_fees = ledger.total_fees();
    let trades = ledger.into_trades();
    info!(
        strategy = strategy.name(),
        trades = trades.len(),
        final_capital,
        faults = faults.total(),
        "backtest finished"
    );

    Ok(RunResult {
        strategy: strategy.name().to_string(),
        params: strategy.params().clone(),
        initial_capital: config.initial_capital,
        final_capital,
        equity_curve,
        trades,
        total_fees,
        faults: faults.summary(),
    })
}

/// Fill `action` locally and apply it to the ledger.
pub(crate) fn apply_action(ledger: &mut Ledger, action: BarAction, bar: &Bar, index: usize) {
    match action {
        BarAction::None => {}
        BarAction::Open {
            side,
            price,
            stop_loss,
            take_profit,
        } => {
            let Some(fill) = ledger.simulate_entry(side, price, bar.timestamp) else {
                return;
            };
            if ledger
                .open(side, &fill, index, stop_loss, take_profit)
                .is_some()
            {
                debug!(bar = index, ?side, price = fill.price, size = fill.size, "position opened");
            }
        }
        BarAction::Close { reason, price } => {
            let Some(fill) = ledger.simulate_exit(price, bar.timestamp) else {
                return;
            };
            if let Some(trade) = ledger.close(&fill, index, reason) {
                debug!(bar = index, ?reason, price = trade.exit_price, pnl = trade.pnl, "position closed");
            }
        }
    }
}
