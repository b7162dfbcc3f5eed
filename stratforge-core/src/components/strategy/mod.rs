//! Strategy contract — a pure function from bar history to a `TradeSignal`.
//!
//! Strategies are portfolio-agnostic: they see bars up to and including the
//! current index plus their own precomputed indicator columns, never ledger
//! state. `analyze` must be deterministic for identical inputs so backtests,
//! walk-forward windows and paper sessions reproduce each other.

pub mod bollinger_reversion;
pub mod donchian_breakout;
pub mod ma_crossover;
pub mod macd_crossover;
pub mod rsi_reversion;
pub mod supertrend;
pub mod triple_ema;
pub mod volatility_breakout;

use crate::components::indicator::IndicatorValues;
use crate::domain::{Bar, ParamSchema, ParameterSet, TradeSignal};
use crate::error::StrategyFault;

pub use bollinger_reversion::BollingerReversion;
pub use donchian_breakout::DonchianBreakout;
pub use ma_crossover::{MaCrossover, MaType};
pub use macd_crossover::MacdCrossover;
pub use rsi_reversion::RsiReversion;
pub use supertrend::SupertrendFlip;
pub use triple_ema::TripleEma;
pub use volatility_breakout::VolatilityBreakout;

/// Trait every strategy implements.
///
/// # Look-ahead contract
/// `precompute` may only derive column values at index t from bars `..=t`.
/// `analyze` may only read `bars[..=index]`. The engine forces HOLD for
/// `index < required_history()` regardless of what `analyze` returns.
pub trait Strategy: Send + Sync {
    /// Registry name (e.g., "ma_crossover").
    fn name(&self) -> &str;

    /// Effective parameters of this instance.
    fn params(&self) -> &ParameterSet;

    fn default_params(&self) -> ParameterSet;

    /// Search space for the optimizer.
    fn param_schema(&self) -> ParamSchema;

    /// Minimum number of bars before a non-HOLD output is meaningful.
    fn required_history(&self) -> usize;

    /// Derived columns, computed once per series before the bar loop.
    fn precompute(&self, bars: &[Bar]) -> IndicatorValues;

    /// Signal for `bars[index]`.
    fn analyze(
        &self,
        bars: &[Bar],
        index: usize,
        indicators: &IndicatorValues,
    ) -> Result<TradeSignal, StrategyFault>;
}

/// `(previous, current)` finite values of a column, if both exist.
pub(crate) fn pair(indicators: &IndicatorValues, key: &str, index: usize) -> Option<(f64, f64)> {
    if index == 0 {
        return None;
    }
    Some((
        indicators.valid(key, index - 1)?,
        indicators.valid(key, index)?,
    ))
}

/// Fetch a bar or report a fault naming the strategy.
pub(crate) fn bar_at<'a>(
    name: &str,
    bars: &'a [Bar],
    index: usize,
) -> Result<&'a Bar, StrategyFault> {
    bars.get(index).ok_or_else(|| {
        StrategyFault::new(
            name,
            index,
            format!("index out of range for {} bars", bars.len()),
        )
    })
}
