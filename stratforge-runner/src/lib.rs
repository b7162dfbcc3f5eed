//! StratForge Runner — scoring, parameter search and time-partitioned validation.
//!
//! Built on the core backtest engine:
//! - Performance metrics (pure functions over a `RunResult`)
//! - Fitness metric selector with search direction
//! - Seeded random-search optimizer with parallel trials and adaptive mode
//! - Walk-forward validation and the single-split out-of-sample tester
//! - TOML run configuration

pub mod config;
pub mod experiment;
pub mod fitness;
pub mod metrics;
pub mod oos;
pub mod optimizer;
pub mod walk_forward;

pub use config::{RunConfig, RunConfigError};
pub use experiment::Experiment;
pub use fitness::{Direction, FitnessMetric};
pub use metrics::{compute_metrics, Metrics};
pub use oos::{run_oos, OosConfig, OosError, OosResult, OverfitVerdict};
pub use optimizer::{
    optimize, optimize_adaptive, AdaptiveConfig, AdaptiveResult, OptimizationResult, OptimizeError,
    OptimizerConfig, ParamEpoch, Sampler, Trial,
};
pub use walk_forward::{
    create_windows, run_walk_forward, EfficiencyFlag, WalkForwardConfig, WalkForwardError,
    WalkForwardResult, WalkForwardWindow,
};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};
    use stratforge_core::domain::{
        Bar, EquityPoint, ExitReason, FaultSummary, ParameterSet, RunResult, Side, Trade,
    };

    /// Daily bars: a slow uptrend with a 40-bar swing on top, so moving
    /// averages cross several times.
    pub fn trending_bars(n: usize) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
        let mut prev = 100.0;
        (0..n)
            .map(|i| {
                let x = i as f64;
                let close = 100.0 + 0.05 * x + 8.0 * (x * std::f64::consts::TAU / 40.0).sin();
                let open = prev;
                prev = close;
                Bar::new(
                    t0 + Duration::days(i as i64),
                    open,
                    open.max(close) * 1.004,
                    open.min(close) * 0.996,
                    close,
                    10_000.0,
                )
            })
            .collect()
    }

    /// A run whose equity curve is `equity` (one point per day) and whose
    /// initial and final capital are its first and last points.
    pub fn make_result(equity: &[f64], trades: Vec<Trade>) -> RunResult {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        RunResult {
            strategy: "fixture".into(),
            params: ParameterSet::new(),
            initial_capital: equity.first().copied().unwrap_or(0.0),
            final_capital: equity.last().copied().unwrap_or(0.0),
            equity_curve: equity
                .iter()
                .enumerate()
                .map(|(i, &e)| EquityPoint {
                    timestamp: t0 + Duration::days(i as i64),
                    equity: e,
                })
                .collect(),
            total_fees: trades.iter().map(|t| t.fees).sum(),
            trades,
            faults: FaultSummary::default(),
        }
    }

    pub fn make_trade(pnl: f64, entry_index: usize, exit_index: usize) -> Trade {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Trade {
            side: Side::Long,
            entry_index,
            entry_time: t0 + Duration::days(entry_index as i64),
            entry_price: 100.0,
            exit_index,
            exit_time: t0 + Duration::days(exit_index as i64),
            exit_price: 100.0 + pnl / 10.0,
            exit_reason: ExitReason::Signal,
            size: 10.0,
            gross_pnl: pnl,
            fees: 0.0,
            pnl,
        }
    }
}
