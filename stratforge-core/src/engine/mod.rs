//! Backtesting engine — deterministic bar loop and the pieces the live engine reuses.
//!
//! The engine consumes a validated bar series and one strategy wrapped in a
//! filter chain, then for each bar:
//!
//! 1. Signal: `SignalPipeline` (warmup → HOLD, faults → HOLD)
//! 2. Decision: `plan_bar` (stop-loss, take-profit, opposite signal, end of data)
//! 3. Fill: `Ledger::simulate_entry` / `simulate_exit` with the `CostModel`
//! 4. Equity: cash plus mark-to-market at the close

pub mod backtest;
pub mod config;
pub mod cost_model;
pub mod ledger;
pub mod pipeline;
pub mod step;

pub use backtest::{run_backtest, run_filtered};
pub use config::BacktestConfig;
pub use cost_model::CostModel;
pub use ledger::Ledger;
pub use pipeline::{FaultTracker, SignalPipeline};
pub use step::{plan_bar, BarAction};
