//! Moving average crossover — golden cross and death cross detection.
//!
//! BUY when the fast MA crosses above the slow MA, SELL when it crosses below.
//! Strength scales with the gap between the averages relative to the slow MA.

use serde_json::json;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::components::registry::StrategyDescriptor;
use crate::domain::{Bar, ParamSchema, ParamSpec, ParameterSet, TradeSignal};
use crate::error::{ConfigError, StrategyFault};
use crate::indicators::{Ema, Sma};

use super::{bar_at, pair, Strategy};

/// Moving average type selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaType {
    Sma,
    Ema,
}

impl MaType {
    fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "sma" => Ok(MaType::Sma),
            "ema" => Ok(MaType::Ema),
            other => Err(ConfigError::InvalidParam {
                name: "ma_type".into(),
                reason: format!("expected 'sma' or 'ema', got '{other}'"),
            }),
        }
    }

    fn indicator(&self, period: usize) -> Box<dyn Indicator> {
        match self {
            MaType::Sma => Box::new(Sma::new(period)),
            MaType::Ema => Box::new(Ema::new(period)),
        }
    }
}

/// Moving average crossover strategy.
///
/// # Indicator dependencies
/// `{ma_type}_{fast_period}` and `{ma_type}_{slow_period}`, e.g. `sma_9`, `sma_21`.
#[derive(Debug, Clone)]
pub struct MaCrossover {
    pub fast_period: usize,
    pub slow_period: usize,
    pub ma_type: MaType,
    fast_key: String,
    slow_key: String,
    params: ParameterSet,
}

impl MaCrossover {
    pub const NAME: &'static str = "ma_crossover";

    pub fn new(fast_period: usize, slow_period: usize, ma_type: MaType) -> Result<Self, ConfigError> {
        if fast_period < 1 {
            return Err(ConfigError::InvalidParam {
                name: "fast_period".into(),
                reason: "must be >= 1".into(),
            });
        }
        if slow_period <= fast_period {
            return Err(ConfigError::InvalidParam {
                name: "slow_period".into(),
                reason: format!("must be greater than fast_period ({fast_period})"),
            });
        }
        let fast = ma_type.indicator(fast_period);
        let slow = ma_type.indicator(slow_period);
        let ma_label = match ma_type {
            MaType::Sma => "sma",
            MaType::Ema => "ema",
        };
        Ok(Self {
            fast_period,
            slow_period,
            ma_type,
            fast_key: fast.name().to_string(),
            slow_key: slow.name().to_string(),
            params: ParameterSet::new()
                .with("fast_period", fast_period as i64)
                .with("slow_period", slow_period as i64)
                .with("ma_type", ma_label),
        })
    }

    pub fn from_params(params: &ParameterSet) -> Result<Self, ConfigError> {
        Self::new(
            params.usize("fast_period")?,
            params.usize("slow_period")?,
            MaType::parse(params.text("ma_type")?)?,
        )
    }

    pub fn defaults() -> ParameterSet {
        ParameterSet::new()
            .with("fast_period", 9i64)
            .with("slow_period", 21i64)
            .with("ma_type", "sma")
    }

    pub fn schema() -> ParamSchema {
        ParamSchema::new()
            .with("fast_period", ParamSpec::int(2, 100, "Fast moving average period"))
            .with("slow_period", ParamSpec::int(5, 200, "Slow moving average period"))
            .with("ma_type", ParamSpec::choice(&["sma", "ema"], "Moving average type"))
    }

    pub fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor {
            name: Self::NAME,
            description: "Buy on golden cross, sell on death cross",
            default_params: Self::defaults,
            param_schema: Self::schema,
            build: |p| Ok(Box::new(Self::from_params(p)?)),
        }
    }
}

impl Strategy for MaCrossover {
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
        self.fast_period.max(self.slow_period) + 1
    }

    fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        let fast = self.ma_type.indicator(self.fast_period);
        let slow = self.ma_type.indicator(self.slow_period);
        IndicatorValues::from_indicators(bars, &[fast.as_ref(), slow.as_ref()])
    }

    fn analyze(
        &self,
        bars: &[Bar],
        index: usize,
        indicators: &IndicatorValues,
    ) -> Result<TradeSignal, StrategyFault> {
        bar_at(Self::NAME, bars, index)?;
        let (Some((prev_fast, fast)), Some((prev_slow, slow))) = (
            pair(indicators, &self.fast_key, index),
            pair(indicators, &self.slow_key, index),
        ) else {
            return Ok(TradeSignal::hold());
        };
        if slow == 0.0 {
            return Ok(TradeSignal::hold());
        }

        let strength = ((fast - slow).abs() / slow * 100.0).min(1.0);
        let signal = if prev_fast <= prev_slow && fast > slow {
            TradeSignal::buy(strength).with_meta("crossover_type", "golden_cross")
        } else if prev_fast >= prev_slow && fast < slow {
            TradeSignal::sell(strength).with_meta("crossover_type", "death_cross")
        } else {
            return Ok(TradeSignal::hold());
        };
        Ok(signal
            .with_meta("ma_fast", json!(fast))
            .with_meta("ma_slow", json!(slow)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Signal;
    use crate::indicators::make_bars;

    fn signals(strategy: &MaCrossover, closes: &[f64]) -> Vec<Signal> {
        let bars = make_bars(closes);
        let iv = strategy.precompute(&bars);
        (0..bars.len())
            .map(|i| strategy.analyze(&bars, i, &iv).unwrap().signal)
            .collect()
    }

    #[test]
    fn golden_cross_then_death_cross() {
        let s = MaCrossover::new(2, 4, MaType::Sma).unwrap();
        let closes = [10.0, 9.8, 9.6, 9.4, 9.2, 12.0, 14.0, 15.0, 10.0, 7.0, 6.0];
        let sig = signals(&s, &closes);
        let first_buy = sig.iter().position(|s| *s == Signal::Buy).unwrap();
        let first_sell = sig.iter().position(|s| *s == Signal::Sell).unwrap();
        assert!(first_buy < first_sell);
        assert_eq!(sig.iter().filter(|s| **s == Signal::Buy).count(), 1);
    }

    #[test]
    fn no_signal_during_warmup() {
        let s = MaCrossover::new(3, 5, MaType::Ema).unwrap();
        let sig = signals(&s, &[1.0, 2.0, 3.0, 4.0]);
        assert!(sig.iter().all(|s| *s == Signal::Hold));
    }

    #[test]
    fn rejects_inverted_periods() {
        assert!(MaCrossover::new(20, 10, MaType::Sma).is_err());
        let p = MaCrossover::defaults().with("ma_type", "wma");
        assert!(MaCrossover::from_params(&p).is_err());
    }

    #[test]
    fn required_history_is_slow_plus_one() {
        let s = MaCrossover::from_params(&MaCrossover::defaults()).unwrap();
        assert_eq!(s.required_history(), 22);
        assert_eq!(s.params().usize("fast_period").unwrap(), 9);
    }

    #[test]
    fn strength_is_bounded() {
        let s = MaCrossover::new(2, 4, MaType::Sma).unwrap();
        let bars = make_bars(&[10.0, 10.0, 10.0, 10.0, 9.0, 30.0]);
        let iv = s.precompute(&bars);
        let sig = s.analyze(&bars, 5, &iv).unwrap();
        assert_eq!(sig.signal, Signal::Buy);
        assert!(sig.strength <= 1.0 && sig.strength > 0.0);
    }

    #[test]
    fn out_of_range_index_faults() {
        let s = MaCrossover::new(2, 4, MaType::Sma).unwrap();
        let bars = make_bars(&[1.0, 2.0]);
        let iv = s.precompute(&bars);
        assert!(s.analyze(&bars, 5, &iv).is_err());
    }
}
