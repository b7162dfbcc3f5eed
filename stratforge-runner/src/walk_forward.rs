//! Walk-forward validation — rolling optimize-then-test windows.
//!
//! The series is cut into `n_splits` consecutive windows (the last absorbs
//! the remainder). Each window's first `train_ratio` share is the train
//! slice, the rest the test slice, so train always precedes test and the
//! windows together cover every bar exactly once. The optimizer only ever
//! sees a train slice; the chosen parameters are then backtested once on
//! the matching test slice.
//!
//! Efficiency ratio: mean OOS return / mean IS return.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use stratforge_core::domain::{Bar, ParameterSet};
use stratforge_core::error::EngineError;
use thiserror::Error;
use tracing::info;

use crate::experiment::Experiment;
use crate::metrics::Metrics;
use crate::optimizer::{optimize, OptimizeError, OptimizerConfig};

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkForwardConfig {
    /// Number of windows (default 5).
    pub n_splits: usize,
    /// Share of each window used for training (default 0.7).
    pub train_ratio: f64,
    pub optimizer: OptimizerConfig,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            n_splits: 5,
            train_ratio: 0.7,
            optimizer: OptimizerConfig::default(),
        }
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Bar index ranges of one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardWindow {
    pub index: usize,
    pub train_range: Range<usize>,
    pub test_range: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowResult {
    pub window: WalkForwardWindow,
    pub best_params: ParameterSet,
    pub train_score: f64,
    pub in_sample: Metrics,
    pub out_of_sample: Metrics,
}

/// How the efficiency ratio was computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EfficiencyFlag {
    Normal,
    /// Mean in-sample return <= 0: ratio reported as 0.0.
    NonPositiveInSample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardSummary {
    pub mean_oos_return_pct: f64,
    /// Population standard deviation across windows.
    pub std_oos_return_pct: f64,
    pub mean_oos_sharpe: f64,
    pub mean_oos_max_drawdown_pct: f64,
    pub total_oos_trades: usize,
    /// Test-slice returns chained window after window.
    pub compounded_oos_return_pct: f64,
    pub mean_is_return_pct: f64,
    pub efficiency_ratio: f64,
    pub efficiency_flag: EfficiencyFlag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardResult {
    pub strategy: String,
    pub windows: Vec<WindowResult>,
    pub summary: WalkForwardSummary,
}

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("n_splits must be at least 1")]
    NoSplits,
    #[error("train_ratio must be in (0, 1), got {0}")]
    InvalidTrainRatio(f64),
    #[error("cannot fit {n_splits} windows with train and test bars into {total_bars} bars")]
    InsufficientData { n_splits: usize, total_bars: usize },
    #[error("optimization failed on window {window}")]
    OptimizeFailed {
        window: usize,
        #[source]
        source: OptimizeError,
    },
    #[error("backtest failed on window {window}")]
    BacktestFailed {
        window: usize,
        #[source]
        source: EngineError,
    },
}

// ─── Window creation ─────────────────────────────────────────────────

/// Split `total_bars` into `n_splits` train/test windows.
///
/// `window = total_bars / n_splits`; the last window runs to the end of the
/// series. Every window needs at least one train and one test bar.
pub fn create_windows(
    total_bars: usize,
    n_splits: usize,
    train_ratio: f64,
) -> Result<Vec<WalkForwardWindow>, WalkForwardError> {
    if n_splits == 0 {
        return Err(WalkForwardError::NoSplits);
    }
    if train_ratio.is_nan() || train_ratio <= 0.0 || train_ratio >= 1.0 {
        return Err(WalkForwardError::InvalidTrainRatio(train_ratio));
    }
    let size = total_bars / n_splits;
    if size < 2 {
        return Err(WalkForwardError::InsufficientData {
            n_splits,
            total_bars,
        });
    }

    let mut windows = Vec::with_capacity(n_splits);
    for index in 0..n_splits {
        let start = index * size;
        let end = if index + 1 == n_splits {
            total_bars
        } else {
            start + size
        };
        let len = end - start;
        let train_len = ((len as f64 * train_ratio).floor() as usize).clamp(1, len - 1);
        windows.push(WalkForwardWindow {
            index,
            train_range: start..start + train_len,
            test_range: start + train_len..end,
        });
    }
    Ok(windows)
}

// ─── Walk-forward orchestration ──────────────────────────────────────

/// Optimize on each train slice, backtest the winner on its test slice and
/// aggregate.
pub fn run_walk_forward(
    experiment: &Experiment,
    bars: &[Bar],
    config: &WalkForwardConfig,
) -> Result<WalkForwardResult, WalkForwardError> {
    let windows = create_windows(bars.len(), config.n_splits, config.train_ratio)?;
    let mut results = Vec::with_capacity(windows.len());

    for window in windows {
        let train = &bars[window.train_range.clone()];
        let test = &bars[window.test_range.clone()];
        let opt = optimize(experiment, train, &config.optimizer).map_err(|source| {
            WalkForwardError::OptimizeFailed {
                window: window.index,
                source,
            }
        })?;

        let backtest_failed = |source: EngineError| WalkForwardError::BacktestFailed {
            window: window.index,
            source,
        };
        // best_params already carries the base overrides.
        let (_, in_sample) = experiment.evaluate(&opt.best_params, train).map_err(backtest_failed)?;
        let (_, out_of_sample) = experiment.evaluate(&opt.best_params, test).map_err(backtest_failed)?;

        info!(
            window = window.index,
            train_bars = train.len(),
            test_bars = test.len(),
            train_score = opt.best_score,
            is_return_pct = in_sample.total_return_pct,
            oos_return_pct = out_of_sample.total_return_pct,
            params = %opt.best_params,
            "walk-forward window finished"
        );

        results.push(WindowResult {
            window,
            best_params: opt.best_params,
            train_score: opt.best_score,
            in_sample,
            out_of_sample,
        });
    }

    let summary = summarize(&results);
    info!(
        strategy = experiment.strategy_name(),
        windows = results.len(),
        efficiency_ratio = summary.efficiency_ratio,
        compounded_oos_return_pct = summary.compounded_oos_return_pct,
        "walk-forward finished"
    );
    Ok(WalkForwardResult {
        strategy: experiment.strategy_name().to_string(),
        windows: results,
        summary,
    })
}

/// Aggregate statistics across window results.
pub fn summarize(windows: &[WindowResult]) -> WalkForwardSummary {
    let oos_returns: Vec<f64> = windows.iter().map(|w| w.out_of_sample.total_return_pct).collect();
    let is_returns: Vec<f64> = windows.iter().map(|w| w.in_sample.total_return_pct).collect();
    let mean_oos_return_pct = mean(&oos_returns);
    let mean_is_return_pct = mean(&is_returns);
    let variance = if oos_returns.is_empty() {
        0.0
    } else {
        oos_returns
            .iter()
            .map(|r| (r - mean_oos_return_pct).powi(2))
            .sum::<f64>()
            / oos_returns.len() as f64
    };
    let compounded = oos_returns.iter().fold(1.0, |acc, r| acc * (1.0 + r / 100.0));
    let (efficiency_ratio, efficiency_flag) = efficiency_ratio(mean_is_return_pct, mean_oos_return_pct);

    WalkForwardSummary {
        mean_oos_return_pct,
        std_oos_return_pct: variance.sqrt(),
        mean_oos_sharpe: mean(&windows.iter().map(|w| w.out_of_sample.sharpe_ratio).collect::<Vec<_>>()),
        mean_oos_max_drawdown_pct: mean(
            &windows
                .iter()
                .map(|w| w.out_of_sample.max_drawdown_pct)
                .collect::<Vec<_>>(),
        ),
        total_oos_trades: windows.iter().map(|w| w.out_of_sample.total_trades).sum(),
        compounded_oos_return_pct: (compounded - 1.0) * 100.0,
        mean_is_return_pct,
        efficiency_ratio,
        efficiency_flag,
    }
}

/// OOS / IS mean return; 0.0 when the in-sample mean is not positive.
fn efficiency_ratio(mean_is: f64, mean_oos: f64) -> (f64, EfficiencyFlag) {
    if mean_is.is_nan() || mean_is <= 0.0 || !mean_oos.is_finite() {
        return (0.0, EfficiencyFlag::NonPositiveInSample);
    }
    (mean_oos / mean_is, EfficiencyFlag::Normal)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}
