//! RSI mean reversion — trade RSI leaving the oversold / overbought zones.
//!
//! BUY when RSI crosses back above `oversold`, SELL when it crosses back below
//! `overbought`. Optional percentage stop-loss / take-profit around the close.

use serde_json::json;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::components::registry::StrategyDescriptor;
use crate::domain::{Bar, ParamSchema, ParamSpec, ParameterSet, TradeSignal};
use crate::error::{ConfigError, StrategyFault};
use crate::indicators::Rsi;

use super::{bar_at, pair, Strategy};

#[derive(Debug, Clone)]
pub struct RsiReversion {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
    /// Percent distance of the stop from the entry close; 0 disables.
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    rsi_key: String,
    params: ParameterSet,
}

impl RsiReversion {
    pub const NAME: &'static str = "rsi_reversion";

    pub fn from_params(params: &ParameterSet) -> Result<Self, ConfigError> {
        let period = params.usize("period")?;
        let oversold = params.f64("oversold")?;
        let overbought = params.f64("overbought")?;
        let stop_loss_pct = params.f64("stop_loss_pct")?;
        let take_profit_pct = params.f64("take_profit_pct")?;
        if period < 2 {
            return Err(ConfigError::InvalidParam {
                name: "period".into(),
                reason: "must be >= 2".into(),
            });
        }
        if oversold >= overbought {
            return Err(ConfigError::InvalidParam {
                name: "oversold".into(),
                reason: format!("must be below overbought ({overbought})"),
            });
        }
        Ok(Self {
            period,
            oversold,
            overbought,
            stop_loss_pct,
            take_profit_pct,
            rsi_key: Rsi::key(period),
            params: params.clone(),
        })
    }

    pub fn defaults() -> ParameterSet {
        ParameterSet::new()
            .with("period", 14i64)
            .with("oversold", 30i64)
            .with("overbought", 70i64)
            .with("stop_loss_pct", 0.0)
            .with("take_profit_pct", 0.0)
    }

    pub fn schema() -> ParamSchema {
        ParamSchema::new()
            .with("period", ParamSpec::int(2, 50, "RSI calculation period"))
            .with("oversold", ParamSpec::int(5, 50, "Oversold threshold (buy signal)"))
            .with("overbought", ParamSpec::int(50, 95, "Overbought threshold (sell signal)"))
            .with("stop_loss_pct", ParamSpec::float(0.0, 20.0, "Stop distance in percent, 0 = none"))
            .with("take_profit_pct", ParamSpec::float(0.0, 50.0, "Target distance in percent, 0 = none"))
    }

    pub fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor {
            name: Self::NAME,
            description: "Buy when RSI leaves oversold, sell when it leaves overbought",
            default_params: Self::defaults,
            param_schema: Self::schema,
            build: |p| Ok(Box::new(Self::from_params(p)?)),
        }
    }

    fn with_exits(&self, signal: TradeSignal, close: f64, long: bool) -> TradeSignal {
        let dir = if long { 1.0 } else { -1.0 };
        let mut signal = signal;
        if self.stop_loss_pct > 0.0 {
            signal = signal.with_stop_loss(close * (1.0 - dir * self.stop_loss_pct / 100.0));
        }
        if self.take_profit_pct > 0.0 {
            signal = signal.with_take_profit(close * (1.0 + dir * self.take_profit_pct / 100.0));
        }
        signal
    }
}

impl Strategy for RsiReversion {
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
        self.period + 2
    }

    fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        IndicatorValues::from_indicators(bars, &[&Rsi::new(self.period) as &dyn Indicator])
    }

    fn analyze(
        &self,
        bars: &[Bar],
        index: usize,
        indicators: &IndicatorValues,
    ) -> Result<TradeSignal, StrategyFault> {
        let close = bar_at(Self::NAME, bars, index)?.close;
        let Some((prev, rsi)) = pair(indicators, &self.rsi_key, index) else {
            return Ok(TradeSignal::hold());
        };

        if prev <= self.oversold && rsi > self.oversold {
            let strength = (self.oversold - prev + 10.0) / 20.0;
            let signal = TradeSignal::buy(strength)
                .with_meta("condition", "oversold_exit")
                .with_meta("rsi", json!(rsi));
            return Ok(self.with_exits(signal, close, true));
        }
        if prev >= self.overbought && rsi < self.overbought {
            let strength = (prev - self.overbought + 10.0) / 20.0;
            let signal = TradeSignal::sell(strength)
                .with_meta("condition", "overbought_exit")
                .with_meta("rsi", json!(rsi));
            return Ok(self.with_exits(signal, close, false));
        }
        Ok(TradeSignal::hold())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Signal;
    use crate::indicators::make_bars;

    fn strategy(sl: f64, tp: f64) -> RsiReversion {
        let p = RsiReversion::defaults()
            .with("period", 3i64)
            .with("stop_loss_pct", sl)
            .with("take_profit_pct", tp);
        RsiReversion::from_params(&p).unwrap()
    }

    fn sell_off_then_bounce() -> Vec<f64> {
        vec![100.0, 101.0, 100.0, 98.0, 95.0, 91.0, 86.0, 90.0, 95.0]
    }

    #[test]
    fn buys_on_oversold_exit() {
        let s = strategy(0.0, 0.0);
        let bars = make_bars(&sell_off_then_bounce());
        let iv = s.precompute(&bars);
        let sig: Vec<Signal> = (0..bars.len())
            .map(|i| s.analyze(&bars, i, &iv).unwrap().signal)
            .collect();
        assert_eq!(sig[7], Signal::Buy);
        assert!(sig[..7].iter().all(|s| *s == Signal::Hold));
    }

    #[test]
    fn attaches_percentage_exits() {
        let s = strategy(2.0, 5.0);
        let bars = make_bars(&sell_off_then_bounce());
        let iv = s.precompute(&bars);
        let sig = s.analyze(&bars, 7, &iv).unwrap();
        assert!((sig.stop_loss.unwrap() - 90.0 * 0.98).abs() < 1e-9);
        assert!((sig.take_profit.unwrap() - 90.0 * 1.05).abs() < 1e-9);
    }

    #[test]
    fn rejects_crossed_thresholds() {
        let p = RsiReversion::defaults().with("oversold", 80i64);
        assert!(RsiReversion::from_params(&p).is_err());
    }
}
