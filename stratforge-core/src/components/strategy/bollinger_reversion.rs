//! Bollinger band mean reversion.
//!
//! BUY when the close is at or below the lower band (or bounces back above
//! it), SELL on the mirror condition at the upper band. Stops sit 1% beyond
//! the touched band; the target is the middle band.

use serde_json::json;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::components::registry::StrategyDescriptor;
use crate::domain::{Bar, ParamSchema, ParamSpec, ParameterSet, TradeSignal};
use crate::error::{ConfigError, StrategyFault};
use crate::indicators::Bollinger;

use super::{bar_at, Strategy};

#[derive(Debug, Clone)]
pub struct BollingerReversion {
    pub period: usize,
    pub std_dev: f64,
    upper: Bollinger,
    middle: Bollinger,
    lower: Bollinger,
    params: ParameterSet,
}

impl BollingerReversion {
    pub const NAME: &'static str = "bollinger_reversion";

    pub fn from_params(params: &ParameterSet) -> Result<Self, ConfigError> {
        let period = params.usize("period")?;
        let std_dev = params.f64("std_dev")?;
        if period < 2 {
            return Err(ConfigError::InvalidParam {
                name: "period".into(),
                reason: "must be >= 2".into(),
            });
        }
        if !(std_dev > 0.0) {
            return Err(ConfigError::InvalidParam {
                name: "std_dev".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self {
            period,
            std_dev,
            upper: Bollinger::upper(period, std_dev),
            middle: Bollinger::middle(period, std_dev),
            lower: Bollinger::lower(period, std_dev),
            params: params.clone(),
        })
    }

    pub fn defaults() -> ParameterSet {
        ParameterSet::new()
            .with("period", 20i64)
            .with("std_dev", 2.0)
    }

    pub fn schema() -> ParamSchema {
        ParamSchema::new()
            .with("period", ParamSpec::int(5, 100, "Moving average period"))
            .with("std_dev", ParamSpec::float(0.5, 4.0, "Standard deviation multiplier"))
    }

    pub fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor {
            name: Self::NAME,
            description: "Mean reversion at the Bollinger bands",
            default_params: Self::defaults,
            param_schema: Self::schema,
            build: |p| Ok(Box::new(Self::from_params(p)?)),
        }
    }

    fn bands(&self, iv: &IndicatorValues, index: usize) -> Option<(f64, f64, f64)> {
        Some((
            iv.valid(self.upper.name(), index)?,
            iv.valid(self.middle.name(), index)?,
            iv.valid(self.lower.name(), index)?,
        ))
    }
}

impl Strategy for BollingerReversion {
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
        self.period + 1
    }

    fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        IndicatorValues::from_indicators(
            bars,
            &[&self.upper as &dyn Indicator, &self.middle, &self.lower],
        )
    }

    fn analyze(
        &self,
        bars: &[Bar],
        index: usize,
        indicators: &IndicatorValues,
    ) -> Result<TradeSignal, StrategyFault> {
        let close = bar_at(Self::NAME, bars, index)?.close;
        if index == 0 {
            return Ok(TradeSignal::hold());
        }
        let Some((upper, middle, lower)) = self.bands(indicators, index) else {
            return Ok(TradeSignal::hold());
        };
        let prev_close = bars[index - 1].close;
        let prev = self.bands(indicators, index - 1);

        let width = upper - lower;
        let pct_b = if width > 0.0 { (close - lower) / width } else { 0.5 };

        let bounced_up = prev.is_some_and(|(_, _, pl)| prev_close <= pl && close > lower);
        if close <= lower || bounced_up {
            return Ok(TradeSignal::buy((1.0 - pct_b).clamp(0.5, 1.0))
                .with_stop_loss(lower * 0.99)
                .with_take_profit(middle)
                .with_meta("condition", "lower_band_touch")
                .with_meta("bb_pct", json!(pct_b)));
        }

        let dropped_back = prev.is_some_and(|(pu, _, _)| prev_close >= pu && close < upper);
        if close >= upper || dropped_back {
            return Ok(TradeSignal::sell(pct_b.clamp(0.5, 1.0))
                .with_stop_loss(upper * 1.01)
                .with_take_profit(middle)
                .with_meta("condition", "upper_band_touch")
                .with_meta("bb_pct", json!(pct_b)));
        }
        Ok(TradeSignal::hold())
    }
}
