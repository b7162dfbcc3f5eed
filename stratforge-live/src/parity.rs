//! Backtest/paper parity check.
//!
//! Replays one historical series through the backtest loop and through a
//! paper-mode `LiveEngine` fed bar by bar, then compares trade counts,
//! returns and final capital. Identical configuration must give matching
//! results; a mismatch means the two paths have drifted apart.

use serde::{Deserialize, Serialize};
use stratforge_core::components::{FilterChain, FilterConfig, FilterContext, StrategyDescriptor};
use stratforge_core::domain::{Bar, ParameterSet};
use stratforge_core::engine::{run_filtered, BacktestConfig};
use tracing::{info, warn};

use crate::engine::{LiveConfig, LiveEngine};
use crate::error::LiveError;
use crate::feed::ReplayFeed;
use crate::state::TradingMode;

/// Largest allowed return and capital difference, in percentage points.
pub const DEFAULT_TOLERANCE_PCT: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParityReport {
    pub backtest_trades: usize,
    pub paper_trades: usize,
    pub backtest_return_pct: f64,
    pub paper_return_pct: f64,
    /// |backtest − paper| total return, in percentage points.
    pub return_diff_pct: f64,
    pub trades_diff: usize,
    /// |backtest − paper| final capital relative to the backtest's.
    pub capital_diff_pct: f64,
    pub tolerance_pct: f64,
    pub matches: bool,
}

impl ParityReport {
    fn new(
        backtest_trades: usize,
        paper_trades: usize,
        backtest_return_pct: f64,
        paper_return_pct: f64,
        backtest_capital: f64,
        paper_capital: f64,
        tolerance_pct: f64,
    ) -> Self {
        let return_diff_pct = (backtest_return_pct - paper_return_pct).abs();
        let capital_diff_pct =
            (backtest_capital - paper_capital).abs() / backtest_capital.max(1.0) * 100.0;
        let trades_diff = backtest_trades.abs_diff(paper_trades);
        Self {
            backtest_trades,
            paper_trades,
            backtest_return_pct,
            paper_return_pct,
            return_diff_pct,
            trades_diff,
            capital_diff_pct,
            tolerance_pct,
            matches: trades_diff == 0
                && return_diff_pct <= tolerance_pct
                && capital_diff_pct <= tolerance_pct,
        }
    }
}

/// Run `descriptor` with `params` and `filters` over `bars` in both paths.
///
/// Each path gets its own strategy and filter instances.
pub async fn compare_with_backtest(
    descriptor: &StrategyDescriptor,
    params: &ParameterSet,
    filters: &[FilterConfig],
    context: &FilterContext,
    bars: &[Bar],
    config: &BacktestConfig,
    tolerance_pct: f64,
) -> Result<ParityReport, LiveError> {
    let strategy = descriptor.instantiate(params)?;
    let chain = FilterChain::from_configs(filters)?;
    let backtest = run_filtered(strategy.as_ref(), &chain, context, bars, config)?;

    let strategy = descriptor.instantiate(params)?;
    let chain = FilterChain::from_configs(filters)?;
    let warmup = strategy.required_history().max(chain.required_history());
    let live_config = LiveConfig {
        symbol: descriptor.name.to_string(),
        mode: TradingMode::Paper,
        backtest: config.clone(),
        max_history: bars.len().max(warmup + 1).max(2),
        flatten_on_stop: false,
    };
    let mut engine = LiveEngine::new(strategy, chain, context.clone(), live_config);
    let mut feed = ReplayFeed::new(bars.iter().cloned());
    engine.start(&mut feed).await?;
    let paper = engine.session_result();

    let report = ParityReport::new(
        backtest.trades.len(),
        paper.trades.len(),
        backtest.total_return_pct(),
        paper.total_return_pct(),
        backtest.final_capital,
        paper.final_capital,
        tolerance_pct,
    );
    if report.matches {
        info!(
            strategy = descriptor.name,
            trades = report.backtest_trades,
            return_diff_pct = report.return_diff_pct,
            "paper path matches backtest"
        );
    } else {
        warn!(
            strategy = descriptor.name,
            backtest_trades = report.backtest_trades,
            paper_trades = report.paper_trades,
            return_diff_pct = report.return_diff_pct,
            capital_diff_pct = report.capital_diff_pct,
            "paper path diverges from backtest"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_thresholds() {
        let same = ParityReport::new(4, 4, 12.5, 12.5, 11_250.0, 11_250.0, DEFAULT_TOLERANCE_PCT);
        assert!(same.matches);
        assert_eq!(same.return_diff_pct, 0.0);

        let off_by_trade = ParityReport::new(4, 5, 12.5, 12.5, 11_250.0, 11_250.0, 0.01);
        assert!(!off_by_trade.matches);
        assert_eq!(off_by_trade.trades_diff, 1);

        let drift = ParityReport::new(4, 4, 12.5, 12.52, 11_250.0, 11_252.0, 0.01);
        assert!(!drift.matches);
        assert!((drift.return_diff_pct - 0.02).abs() < 1e-9);
    }
}
