//! Supertrend flip — trade the bar where price crosses the trailing ATR band.
//!
//! BUY when the band moves from above the close to below it (downtrend to
//! uptrend), SELL on the mirror flip. Strength grows with the distance
//! between close and band; long entries carry a stop one ATR beyond the band.

use serde_json::json;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::components::registry::StrategyDescriptor;
use crate::domain::{Bar, ParamSchema, ParamSpec, ParameterSet, TradeSignal};
use crate::error::{ConfigError, StrategyFault};
use crate::indicators::{Atr, Supertrend};

use super::{bar_at, pair, Strategy};

#[derive(Debug, Clone)]
pub struct SupertrendFlip {
    pub atr_period: usize,
    pub multiplier: f64,
    band: Supertrend,
    atr: Atr,
    params: ParameterSet,
}

impl SupertrendFlip {
    pub const NAME: &'static str = "supertrend";

    pub fn from_params(params: &ParameterSet) -> Result<Self, ConfigError> {
        let atr_period = params.usize("atr_period")?;
        let multiplier = params.f64("multiplier")?;
        if atr_period < 1 {
            return Err(ConfigError::InvalidParam {
                name: "atr_period".into(),
                reason: "must be >= 1".into(),
            });
        }
        if !(multiplier > 0.0) {
            return Err(ConfigError::InvalidParam {
                name: "multiplier".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(Self {
            atr_period,
            multiplier,
            band: Supertrend::new(atr_period, multiplier),
            atr: Atr::new(atr_period),
            params: params.clone(),
        })
    }

    pub fn defaults() -> ParameterSet {
        ParameterSet::new()
            .with("atr_period", 10i64)
            .with("multiplier", 3.0)
    }

    pub fn schema() -> ParamSchema {
        ParamSchema::new()
            .with("atr_period", ParamSpec::int(5, 50, "ATR calculation period"))
            .with("multiplier", ParamSpec::float(1.0, 6.0, "ATR multiplier (higher = less sensitive)"))
    }

    pub fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor {
            name: Self::NAME,
            description: "ATR-based trend following; buy on bullish flip, sell on bearish flip",
            default_params: Self::defaults,
            param_schema: Self::schema,
            build: |p| Ok(Box::new(Self::from_params(p)?)),
        }
    }
}

impl Strategy for SupertrendFlip {
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
        self.atr_period + 1
    }

    fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        IndicatorValues::from_indicators(bars, &[&self.band as &dyn Indicator, &self.atr])
    }

    fn analyze(
        &self,
        bars: &[Bar],
        index: usize,
        indicators: &IndicatorValues,
    ) -> Result<TradeSignal, StrategyFault> {
        let close = bar_at(Self::NAME, bars, index)?.close;
        let Some((prev_band, band)) = pair(indicators, self.band.name(), index) else {
            return Ok(TradeSignal::hold());
        };
        let prev_close = bars[index - 1].close;
        let atr = indicators.valid(self.atr.name(), index).unwrap_or(0.0);
        let strength = (0.5 + ((close - band) / close).abs() * 10.0).min(1.0);

        if prev_band >= prev_close && band < close {
            return Ok(TradeSignal::buy(strength)
                .with_stop_loss(band - atr)
                .with_meta("direction", "bullish")
                .with_meta("supertrend", json!(band))
                .with_meta("atr", json!(atr)));
        }
        if prev_band <= prev_close && band > close {
            return Ok(TradeSignal::sell(strength)
                .with_meta("direction", "bearish")
                .with_meta("supertrend", json!(band))
                .with_meta("atr", json!(atr)));
        }
        Ok(TradeSignal::hold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Signal;
    use crate::indicators::make_bars;

    #[test]
    fn flips_on_trend_reversal() {
        let p = ParameterSet::new().with("atr_period", 3i64).with("multiplier", 1.5);
        let s = SupertrendFlip::from_params(&p).unwrap();
        let closes: Vec<f64> = (0..20)
            .map(|i| 100.0 + 2.0 * i as f64)
            .chain((0..20).map(|i| 138.0 - 3.0 * i as f64))
            .chain((0..20).map(|i| 81.0 + 3.0 * i as f64))
            .collect();
        let bars = make_bars(&closes);
        let iv = s.precompute(&bars);
        let out: Vec<TradeSignal> = (0..bars.len())
            .map(|i| s.analyze(&bars, i, &iv).unwrap())
            .collect();

        let sell = out.iter().position(|t| t.signal == Signal::Sell).unwrap();
        let buy = out.iter().rposition(|t| t.signal == Signal::Buy).unwrap();
        assert!((20..30).contains(&sell), "sell at {sell}");
        assert!((40..50).contains(&buy), "buy at {buy}");
        let stop = out[buy].stop_loss.unwrap();
        assert!(stop < bars[buy].close);
        assert!(out[buy].strength >= 0.5 && out[buy].strength <= 1.0);
    }

    #[test]
    fn rejects_non_positive_multiplier() {
        let p = SupertrendFlip::defaults().with("multiplier", 0.0);
        assert!(SupertrendFlip::from_params(&p).is_err());
    }
}
