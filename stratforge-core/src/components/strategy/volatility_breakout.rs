//! Volatility breakout — a move of more than N ATRs from the previous close.
//!
//! BUY when the high clears `prev_close + breakout_multiplier * ATR`, the
//! close is above the EMA, the bar closes in its upper 40 % and volume is
//! above average. SELL when the low breaks the mirror level and either the
//! close is below the EMA or the bar closes weak. Bars whose ATR exceeds
//! `max_atr_pct` of the close are skipped.

use serde_json::json;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::components::registry::StrategyDescriptor;
use crate::domain::{Bar, ParamSchema, ParamSpec, ParameterSet, TradeSignal};
use crate::error::{ConfigError, StrategyFault};
use crate::indicators::series::rolling_mean;
use crate::indicators::{Atr, Ema};

use super::{bar_at, Strategy};

const VOLUME_AVG: &str = "vol_breakout_volume_avg";
const STRONG_CLOSE: f64 = 0.6;
const WEAK_CLOSE: f64 = 0.4;

#[derive(Debug, Clone)]
pub struct VolatilityBreakout {
    pub breakout_multiplier: f64,
    /// Required volume relative to its average; 0 disables.
    pub volume_multiplier: f64,
    pub volume_period: usize,
    /// Maximum ATR as a percentage of the close.
    pub max_atr_pct: f64,
    atr: Atr,
    ema: Ema,
    params: ParameterSet,
}

impl VolatilityBreakout {
    pub const NAME: &'static str = "volatility_breakout";

    pub fn from_params(params: &ParameterSet) -> Result<Self, ConfigError> {
        let breakout_multiplier = params.f64("breakout_multiplier")?;
        if !(breakout_multiplier > 0.0) {
            return Err(ConfigError::InvalidParam {
                name: "breakout_multiplier".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self {
            breakout_multiplier,
            volume_multiplier: params.f64("volume_multiplier")?,
            volume_period: params.usize("volume_period")?.max(1),
            max_atr_pct: params.f64("max_atr_pct")?,
            atr: Atr::new(params.usize("atr_period")?),
            ema: Ema::new(params.usize("ema_period")?),
            params: params.clone(),
        })
    }

    pub fn defaults() -> ParameterSet {
        ParameterSet::new()
            .with("atr_period", 14i64)
            .with("breakout_multiplier", 1.5)
            .with("ema_period", 20i64)
            .with("volume_multiplier", 1.5)
            .with("volume_period", 20i64)
            .with("max_atr_pct", 8.0)
    }

    pub fn schema() -> ParamSchema {
        ParamSchema::new()
            .with("atr_period", ParamSpec::int(7, 21, "ATR period"))
            .with("breakout_multiplier", ParamSpec::float(1.0, 3.0, "ATR multiple that counts as a breakout"))
            .with("ema_period", ParamSpec::int(10, 50, "EMA trend period"))
            .with("volume_multiplier", ParamSpec::float(0.0, 3.0, "Required volume / average, 0 disables"))
            .with("volume_period", ParamSpec::int(5, 50, "Volume average period"))
            .with("max_atr_pct", ParamSpec::float(1.0, 20.0, "Skip bars with ATR above this % of price"))
    }

    pub fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor {
            name: Self::NAME,
            description: "Trade moves beyond the normal ATR range",
            default_params: Self::defaults,
            param_schema: Self::schema,
            build: |p| Ok(Box::new(Self::from_params(p)?)),
        }
    }
}

impl Strategy for VolatilityBreakout {
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
        self.atr
            .lookback()
            .max(self.ema.lookback())
            .max(self.volume_period)
            + 1
    }

    fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        let mut iv = IndicatorValues::from_indicators(bars, &[&self.atr as &dyn Indicator, &self.ema]);
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        iv.insert(VOLUME_AVG, rolling_mean(&volume, self.volume_period));
        iv
    }

    fn analyze(
        &self,
        bars: &[Bar],
        index: usize,
        indicators: &IndicatorValues,
    ) -> Result<TradeSignal, StrategyFault> {
        let bar = bar_at(Self::NAME, bars, index)?;
        if index == 0 {
            return Ok(TradeSignal::hold());
        }
        let (Some(atr), Some(ema)) = (
            indicators.valid(self.atr.name(), index),
            indicators.valid(self.ema.name(), index),
        ) else {
            return Ok(TradeSignal::hold());
        };
        if atr / bar.close * 100.0 > self.max_atr_pct {
            return Ok(TradeSignal::hold().with_meta("reason", "volatility too high"));
        }

        let prev_close = bars[index - 1].close;
        let upper = prev_close + atr * self.breakout_multiplier;
        let lower = prev_close - atr * self.breakout_multiplier;
        let range = bar.high - bar.low;
        let close_location = if range > 0.0 { (bar.close - bar.low) / range } else { 0.5 };
        let volume_ratio = indicators
            .valid(VOLUME_AVG, index)
            .filter(|avg| *avg > 0.0)
            .map_or(1.0, |avg| bar.volume / avg);
        let volume_ok = self.volume_multiplier <= 0.0 || volume_ratio >= self.volume_multiplier;

        if bar.high > upper && bar.close > ema && close_location > STRONG_CLOSE && volume_ok {
            return Ok(TradeSignal::buy((volume_ratio / 2.0).min(1.0))
                .with_stop_loss(bar.close - 2.0 * atr)
                .with_take_profit(bar.close + 3.0 * atr)
                .with_meta("breakout_type", "bullish")
                .with_meta("atr", json!(atr))
                .with_meta("volume_ratio", json!(volume_ratio))
                .with_meta("close_location", json!(close_location)));
        }
        if bar.low < lower && (bar.close < ema || close_location < WEAK_CLOSE) {
            return Ok(TradeSignal::sell(0.8)
                .with_meta("breakout_type", "bearish")
                .with_meta("atr", json!(atr)));
        }
        Ok(TradeSignal::hold())
    }
}
