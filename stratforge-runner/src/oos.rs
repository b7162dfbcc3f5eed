//! Out-of-sample testing — one chronological train/test split.
//!
//! The first `1 - test_ratio` of the series is in-sample, the rest
//! out-of-sample. The same parameters run on both halves and the metric
//! degradation between them becomes an overfitting score in [0, 1]:
//! 0 = no degradation, 1 = complete degradation or reversal.

use serde::{Deserialize, Serialize};
use stratforge_core::domain::{Bar, ParameterSet, RunResult};
use stratforge_core::error::EngineError;
use thiserror::Error;
use tracing::info;

use crate::experiment::Experiment;
use crate::metrics::Metrics;
use crate::optimizer::{optimize, OptimizeError, OptimizerConfig};

pub const MIN_TEST_RATIO: f64 = 0.1;
pub const MAX_TEST_RATIO: f64 = 0.5;

// ─── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OosConfig {
    /// Clamped to [0.1, 0.5].
    pub test_ratio: f64,
    /// When set, parameters are first optimized on the in-sample half.
    pub optimizer: Option<OptimizerConfig>,
}

impl Default for OosConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.3,
            optimizer: None,
        }
    }
}

impl OosConfig {
    pub fn effective_test_ratio(&self) -> f64 {
        if self.test_ratio.is_nan() {
            return MIN_TEST_RATIO;
        }
        self.test_ratio.clamp(MIN_TEST_RATIO, MAX_TEST_RATIO)
    }

    /// First out-of-sample bar index.
    pub fn split_index(&self, total_bars: usize) -> usize {
        (total_bars as f64 * (1.0 - self.effective_test_ratio())).floor() as usize
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// One metric compared across the split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: String,
    pub in_sample: f64,
    pub out_of_sample: f64,
    /// (1 - oos / is) × 100; `None` when the in-sample value is zero or
    /// either side is non-finite.
    pub degradation_pct: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverfitVerdict {
    Robust,
    Moderate,
    Overfit,
}

impl OverfitVerdict {
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            Self::Robust
        } else if score < 0.6 {
            Self::Moderate
        } else {
            Self::Overfit
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OosResult {
    pub strategy: String,
    pub params: ParameterSet,
    pub split_index: usize,
    pub in_sample: Metrics,
    pub out_of_sample: Metrics,
    pub in_sample_run: RunResult,
    pub out_of_sample_run: RunResult,
    pub comparison: Vec<MetricComparison>,
    pub overfitting_score: f64,
    pub verdict: OverfitVerdict,
}

#[derive(Debug, Error)]
pub enum OosError {
    #[error("cannot split {total_bars} bars into non-empty in-sample and out-of-sample halves")]
    InsufficientData { total_bars: usize },
    #[error("in-sample optimization failed")]
    OptimizeFailed(#[source] OptimizeError),
    #[error("{half} backtest failed")]
    BacktestFailed {
        half: &'static str,
        #[source]
        source: EngineError,
    },
}

// ─── Testing ─────────────────────────────────────────────────────────

/// Run `params` (or, with an optimizer configured, the in-sample optimum)
/// on both halves of `bars` and compare.
pub fn run_oos(
    experiment: &Experiment,
    params: &ParameterSet,
    bars: &[Bar],
    config: &OosConfig,
) -> Result<OosResult, OosError> {
    let split = config.split_index(bars.len());
    if split == 0 || split >= bars.len() {
        return Err(OosError::InsufficientData {
            total_bars: bars.len(),
        });
    }
    let (is_bars, oos_bars) = bars.split_at(split);
    info!(in_sample_bars = is_bars.len(), oos_bars = oos_bars.len(), "oos split");

    let params = match &config.optimizer {
        Some(opt_config) => {
            optimize(experiment, is_bars, opt_config)
                .map_err(OosError::OptimizeFailed)?
                .best_params
        }
        None => experiment.effective_params(params),
    };

    let (is_run, is_metrics) = experiment
        .evaluate(&params, is_bars)
        .map_err(|source| OosError::BacktestFailed {
            half: "in-sample",
            source,
        })?;
    let (oos_run, oos_metrics) = experiment
        .evaluate(&params, oos_bars)
        .map_err(|source| OosError::BacktestFailed {
            half: "out-of-sample",
            source,
        })?;

    let comparison = compare(&is_metrics, &oos_metrics);
    let overfitting_score = overfitting_score(&is_metrics, &oos_metrics);
    let verdict = OverfitVerdict::from_score(overfitting_score);
    info!(
        strategy = experiment.strategy_name(),
        is_return_pct = is_metrics.total_return_pct,
        oos_return_pct = oos_metrics.total_return_pct,
        overfitting_score,
        ?verdict,
        "oos test finished"
    );

    Ok(OosResult {
        strategy: experiment.strategy_name().to_string(),
        params,
        split_index: split,
        in_sample: is_metrics,
        out_of_sample: oos_metrics,
        in_sample_run: is_run,
        out_of_sample_run: oos_run,
        comparison,
        overfitting_score,
        verdict,
    })
}

/// Side-by-side rows for the headline metrics.
pub fn compare(is_m: &Metrics, oos_m: &Metrics) -> Vec<MetricComparison> {
    let rows = [
        ("total_return_pct", is_m.total_return_pct, oos_m.total_return_pct),
        ("sharpe_ratio", is_m.sharpe_ratio, oos_m.sharpe_ratio),
        ("max_drawdown_pct", is_m.max_drawdown_pct, oos_m.max_drawdown_pct),
        ("win_rate", is_m.win_rate, oos_m.win_rate),
        ("profit_factor", is_m.profit_factor, oos_m.profit_factor),
        ("total_trades", is_m.total_trades as f64, oos_m.total_trades as f64),
    ];
    rows.into_iter()
        .map(|(metric, is_val, oos_val)| MetricComparison {
            metric: metric.to_string(),
            in_sample: is_val,
            out_of_sample: oos_val,
            degradation_pct: (is_val != 0.0 && is_val.is_finite() && oos_val.is_finite())
                .then(|| (1.0 - oos_val / is_val) * 100.0),
        })
        .collect()
}

/// Mean of the available degradation components, each clamped to [0, 1]:
/// return drop (IS return > 0), Sharpe drop (IS Sharpe > 0) and drawdown
/// growth (IS drawdown > 0). 0.0 when none apply.
pub fn overfitting_score(is_m: &Metrics, oos_m: &Metrics) -> f64 {
    let mut parts = Vec::with_capacity(3);
    if is_m.total_return_pct > 0.0 {
        parts.push(1.0 - oos_m.total_return_pct / is_m.total_return_pct);
    }
    if is_m.sharpe_ratio > 0.0 {
        parts.push(1.0 - oos_m.sharpe_ratio / is_m.sharpe_ratio);
    }
    if is_m.max_drawdown_pct > 0.0 {
        parts.push(oos_m.max_drawdown_pct / is_m.max_drawdown_pct - 1.0);
    }
    let parts: Vec<f64> = parts
        .into_iter()
        .filter(|p| p.is_finite())
        .map(|p| p.clamp(0.0, 1.0))
        .collect();
    if parts.is_empty() {
        return 0.0;
    }
    parts.iter().sum::<f64>() / parts.len() as f64
}
