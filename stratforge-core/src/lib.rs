//! StratForge Core — domain types, strategies, filters, ledger and the backtest engine.
//!
//! This crate contains the heart of the simulator:
//! - Domain types (bars, signals, parameters, positions, trades, run results)
//! - Indicators and the strategy contract with a name-keyed registry
//! - Composable filter chain (regime, multi-timeframe, confidence, sentiment)
//! - Position ledger, cost model and the per-bar decision shared with live trading
//! - Deterministic bar-by-bar backtest with strategy fault isolation

pub mod components;
pub mod domain;
pub mod engine;
pub mod error;
pub mod indicators;
pub mod rng;

pub use components::{FilterChain, FilterConfig, FilterContext, Strategy, StrategyRegistry};
pub use domain::{Bar, ParameterSet, RunResult, Signal, Trade, TradeSignal};
pub use engine::{run_backtest, run_filtered, BacktestConfig};
pub use error::{ConfigError, DataError, EngineError, StrategyFault};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types shared with optimizer workers and the live
    /// engine's task are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<domain::TradeSignal>();
        require_sync::<domain::TradeSignal>();
        require_send::<domain::ParameterSet>();
        require_sync::<domain::ParameterSet>();
        require_send::<domain::ParamSchema>();
        require_sync::<domain::ParamSchema>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::Trade>();
        require_sync::<domain::Trade>();
        require_send::<domain::Fill>();
        require_sync::<domain::Fill>();
        require_send::<domain::OrderRequest>();
        require_sync::<domain::OrderRequest>();
        require_send::<domain::RunResult>();
        require_sync::<domain::RunResult>();

        // Components
        require_send::<components::IndicatorValues>();
        require_sync::<components::IndicatorValues>();
        require_send::<components::FilterChain>();
        require_sync::<components::FilterChain>();
        require_send::<components::FilterContext>();
        require_sync::<components::FilterContext>();
        require_send::<components::StrategyRegistry>();
        require_sync::<components::StrategyRegistry>();
        require_send::<components::StrategyDescriptor>();
        require_sync::<components::StrategyDescriptor>();
        require_send::<Box<dyn components::Strategy>>();
        require_sync::<Box<dyn components::Strategy>>();
        require_send::<components::filter::SentimentFilter>();
        require_sync::<components::filter::SentimentFilter>();

        // Engine
        require_send::<engine::BacktestConfig>();
        require_sync::<engine::BacktestConfig>();
        require_send::<engine::Ledger>();
        require_sync::<engine::Ledger>();
        require_send::<engine::FaultTracker>();
        require_sync::<engine::FaultTracker>();

        // RNG
        require_send::<rng::RngHierarchy>();
        require_sync::<rng::RngHierarchy>();
    }

    /// Architecture contract: neither strategies nor filters receive ledger state.
    ///
    /// The trait signatures take bars, an index and precomputed columns only.
    /// If a ledger parameter is ever added, these stop compiling.
    #[test]
    fn strategy_and_filter_traits_have_no_ledger_parameter() {
        fn _strategy(
            s: &dyn components::Strategy,
            bars: &[domain::Bar],
            iv: &components::IndicatorValues,
        ) -> Result<domain::TradeSignal, StrategyFault> {
            s.analyze(bars, 0, iv)
        }
        fn _filter(
            f: &dyn components::SignalFilter,
            signal: &domain::TradeSignal,
            input: &components::FilterInput<'_>,
        ) -> Result<components::FilterOutcome, StrategyFault> {
            f.apply(signal, input)
        }
    }
}
