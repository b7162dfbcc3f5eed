//! MACD signal-line crossover.
//!
//! BUY when the MACD line crosses above its signal line, SELL when it crosses
//! below. A cross on the far side of zero (bullish above, bearish below) is
//! the stronger signal.

use serde_json::json;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::components::registry::StrategyDescriptor;
use crate::domain::{Bar, ParamSchema, ParamSpec, ParameterSet, TradeSignal};
use crate::error::{ConfigError, StrategyFault};
use crate::indicators::Macd;

use super::{bar_at, pair, Strategy};

const WEAK: f64 = 0.7;
const STRONG: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct MacdCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    line: Macd,
    signal: Macd,
    histogram: Macd,
    params: ParameterSet,
}

impl MacdCrossover {
    pub const NAME: &'static str = "macd_crossover";

    pub fn from_params(params: &ParameterSet) -> Result<Self, ConfigError> {
        let fast = params.usize("fast_period")?;
        let slow = params.usize("slow_period")?;
        let signal = params.usize("signal_period")?;
        if fast < 1 || signal < 1 {
            return Err(ConfigError::InvalidParam {
                name: "fast_period".into(),
                reason: "periods must be >= 1".into(),
            });
        }
        if slow <= fast {
            return Err(ConfigError::InvalidParam {
                name: "slow_period".into(),
                reason: format!("must be greater than fast_period ({fast})"),
            });
        }
        Ok(Self {
            fast_period: fast,
            slow_period: slow,
            signal_period: signal,
            line: Macd::line(fast, slow, signal),
            signal: Macd::signal_line(fast, slow, signal),
            histogram: Macd::histogram(fast, slow, signal),
            params: params.clone(),
        })
    }

    pub fn defaults() -> ParameterSet {
        ParameterSet::new()
            .with("fast_period", 12i64)
            .with("slow_period", 26i64)
            .with("signal_period", 9i64)
    }

    pub fn schema() -> ParamSchema {
        ParamSchema::new()
            .with("fast_period", ParamSpec::int(2, 50, "Fast EMA period"))
            .with("slow_period", ParamSpec::int(10, 100, "Slow EMA period"))
            .with("signal_period", ParamSpec::int(2, 30, "Signal line EMA period"))
    }

    pub fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor {
            name: Self::NAME,
            description: "Buy/sell on MACD and signal line crossovers",
            default_params: Self::defaults,
            param_schema: Self::schema,
            build: |p| Ok(Box::new(Self::from_params(p)?)),
        }
    }
}

impl Strategy for MacdCrossover {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn params(&self) -> &ParameterSet {
        &self.params
    }

    fn default_params(&self) -> ParameterSet {
        Self::defaults()
    }

    fn param_schema(&self) -> ParamSchema {
        Self::schema()
    }

    fn required_history(&self) -> usize {
        self.slow_period + self.signal_period + 1
    }

    fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        IndicatorValues::from_indicators(
            bars,
            &[&self.line as &dyn Indicator, &self.signal, &self.histogram],
        )
    }

    fn analyze(
        &self,
        bars: &[Bar],
        index: usize,
        indicators: &IndicatorValues,
    ) -> Result<TradeSignal, StrategyFault> {
        bar_at(Self::NAME, bars, index)?;
        let (Some((prev_macd, macd)), Some((prev_signal, signal)), Some(hist)) = (
            pair(indicators, self.line.name(), index),
            pair(indicators, self.signal.name(), index),
            indicators.valid(self.histogram.name(), index),
        ) else {
            return Ok(TradeSignal::hold());
        };

        let out = if prev_macd <= prev_signal && macd > signal {
            let strength = if macd > 0.0 { STRONG } else { WEAK };
            TradeSignal::buy(strength).with_meta("crossover", "bullish")
        } else if prev_macd >= prev_signal && macd < signal {
            let strength = if macd < 0.0 { STRONG } else { WEAK };
            TradeSignal::sell(strength).with_meta("crossover", "bearish")
        } else {
            return Ok(TradeSignal::hold());
        };
        Ok(out
            .with_meta("macd", json!(macd))
            .with_meta("signal", json!(signal))
            .with_meta("histogram", json!(hist)))
    }
}
