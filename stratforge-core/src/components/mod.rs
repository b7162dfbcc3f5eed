//! Components — strategies, indicators, filters and the registry that builds them.
//!
//! A run is composed of one strategy plus an ordered filter chain:
//! - Strategy: pure function from bar history to a `TradeSignal`
//! - Filter chain: logical AND of filters that may downgrade a signal to HOLD
//!
//! Plus the indicator trait for precomputed numeric series.

pub mod chain;
pub mod factory;
pub mod filter;
pub mod indicator;
pub mod registry;
pub mod strategy;

pub use chain::FilterChain;
pub use factory::{create_filter, FilterConfig};
pub use filter::{FilterContext, FilterInput, FilterOutcome, SignalFilter, SignalScorer};
pub use indicator::{Indicator, IndicatorValues};
pub use registry::{BuildFn, StrategyDescriptor, StrategyRegistry};
pub use strategy::{
    BollingerReversion, DonchianBreakout, MaCrossover, MaType, MacdCrossover, RsiReversion,
    Strategy, SupertrendFlip, TripleEma, VolatilityBreakout,
};
