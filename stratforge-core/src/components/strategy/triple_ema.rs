//! Triple EMA alignment.
//!
//! The trend is aligned up while fast > medium > slow EMA and down while
//! fast < medium < slow. BUY on the bar an up-alignment has lasted
//! `confirmation_candles` bars, SELL on the same for a down-alignment.
//! Optional ADX and relative-volume gates; a threshold of 0 disables a gate.

use serde_json::json;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::components::registry::StrategyDescriptor;
use crate::domain::{Bar, ParamSchema, ParamSpec, ParameterSet, TradeSignal};
use crate::error::{ConfigError, StrategyFault};
use crate::indicators::series::rolling_mean;
use crate::indicators::{Adx, Ema};

use super::{bar_at, Strategy};

const BULL_RUN: &str = "triple_ema_bull_run";
const BEAR_RUN: &str = "triple_ema_bear_run";
const VOLUME_RATIO: &str = "triple_ema_volume_ratio";

#[derive(Debug, Clone)]
pub struct TripleEma {
    pub confirmation_candles: usize,
    pub adx_threshold: f64,
    pub volume_period: usize,
    pub min_volume_ratio: f64,
    fast: Ema,
    medium: Ema,
    slow: Ema,
    adx: Adx,
    params: ParameterSet,
}

impl TripleEma {
    pub const NAME: &'static str = "triple_ema";

    pub fn from_params(params: &ParameterSet) -> Result<Self, ConfigError> {
        let fast = params.usize("ema_fast")?;
        let medium = params.usize("ema_medium")?;
        let slow = params.usize("ema_slow")?;
        if !(1 <= fast && fast < medium && medium < slow) {
            return Err(ConfigError::InvalidParam {
                name: "ema_medium".into(),
                reason: format!("periods must satisfy fast < medium < slow, got {fast}/{medium}/{slow}"),
            });
        }
        let confirmation_candles = params.usize("confirmation_candles")?.max(1);
        Ok(Self {
            confirmation_candles,
            adx_threshold: params.f64("adx_threshold")?,
            volume_period: params.usize("volume_period")?.max(1),
            min_volume_ratio: params.f64("min_volume_ratio")?,
            fast: Ema::new(fast),
            medium: Ema::new(medium),
            slow: Ema::new(slow),
            adx: Adx::new(params.usize("adx_period")?),
            params: params.clone(),
        })
    }

    pub fn defaults() -> ParameterSet {
        ParameterSet::new()
            .with("ema_fast", 8i64)
            .with("ema_medium", 21i64)
            .with("ema_slow", 55i64)
            .with("confirmation_candles", 2i64)
            .with("adx_period", 14i64)
            .with("adx_threshold", 20.0)
            .with("volume_period", 20i64)
            .with("min_volume_ratio", 0.8)
    }

    pub fn schema() -> ParamSchema {
        ParamSchema::new()
            .with("ema_fast", ParamSpec::int(3, 20, "Fast EMA period"))
            .with("ema_medium", ParamSpec::int(10, 50, "Medium EMA period"))
            .with("ema_slow", ParamSpec::int(30, 200, "Slow EMA period"))
            .with("confirmation_candles", ParamSpec::int(1, 5, "Bars of alignment before a signal"))
            .with("adx_period", ParamSpec::int(7, 30, "ADX period"))
            .with("adx_threshold", ParamSpec::float(0.0, 40.0, "Minimum ADX, 0 disables"))
            .with("volume_period", ParamSpec::int(5, 50, "Volume average period"))
            .with("min_volume_ratio", ParamSpec::float(0.0, 2.0, "Minimum volume / average, 0 disables"))
    }

    pub fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor {
            name: Self::NAME,
            description: "Trade when three EMAs align in one direction",
            default_params: Self::defaults,
            param_schema: Self::schema,
            build: |p| Ok(Box::new(Self::from_params(p)?)),
        }
    }

    fn strength(adx: f64, separation_pct: f64) -> f64 {
        let mut strength: f64 = 0.5;
        if adx > 30.0 {
            strength += 0.2;
        } else if adx > 25.0 {
            strength += 0.1;
        }
        if separation_pct.abs() > 2.0 {
            strength += 0.2;
        }
        strength.min(1.0)
    }
}

/// Length of the current run of `true`, per bar.
fn run_lengths(flags: impl Iterator<Item = bool>) -> Vec<f64> {
    let mut run = 0usize;
    flags
        .map(|on| {
            run = if on { run + 1 } else { 0 };
            run as f64
        })
        .collect()
}

impl Strategy for TripleEma {
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
        self.slow
            .lookback()
            .max(self.adx.lookback())
            .max(self.volume_period)
            + self.confirmation_candles
    }

    fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        let mut iv = IndicatorValues::from_indicators(
            bars,
            &[&self.fast as &dyn Indicator, &self.medium, &self.slow, &self.adx],
        );
        let column = |ema: &Ema| iv.get_series(ema.name()).map(<[f64]>::to_vec).unwrap_or_default();
        let (fast, medium, slow) = (column(&self.fast), column(&self.medium), column(&self.slow));
        // NaN comparisons are false, so warmup bars count as unaligned.
        let bull = run_lengths((0..bars.len()).map(|i| fast[i] > medium[i] && medium[i] > slow[i]));
        let bear = run_lengths((0..bars.len()).map(|i| fast[i] < medium[i] && medium[i] < slow[i]));

        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let avg = rolling_mean(&volume, self.volume_period);
        let ratio = volume
            .iter()
            .zip(&avg)
            .map(|(v, a)| if *a > 0.0 { v / a } else { f64::NAN })
            .collect();

        iv.insert(BULL_RUN, bull);
        iv.insert(BEAR_RUN, bear);
        iv.insert(VOLUME_RATIO, ratio);
        iv
    }

    fn analyze(
        &self,
        bars: &[Bar],
        index: usize,
        indicators: &IndicatorValues,
    ) -> Result<TradeSignal, StrategyFault> {
        bar_at(Self::NAME, bars, index)?;
        if index == 0 {
            return Ok(TradeSignal::hold());
        }
        let (Some(fast), Some(medium), Some(slow), Some(adx)) = (
            indicators.valid(self.fast.name(), index),
            indicators.valid(self.medium.name(), index),
            indicators.valid(self.slow.name(), index),
            indicators.valid(self.adx.name(), index),
        ) else {
            return Ok(TradeSignal::hold());
        };
        let run = |key: &str, i: usize| indicators.valid(key, i).unwrap_or(0.0) as usize;
        let confirm = self.confirmation_candles;
        let just_confirmed =
            |key: &str| run(key, index) >= confirm && run(key, index - 1) < confirm;

        let adx_ok = self.adx_threshold <= 0.0 || adx >= self.adx_threshold;
        let volume_ok = self.min_volume_ratio <= 0.0
            || indicators
                .valid(VOLUME_RATIO, index)
                .is_some_and(|r| r >= self.min_volume_ratio);
        if !(adx_ok && volume_ok) {
            return Ok(TradeSignal::hold());
        }

        let separation = (fast - slow) / slow * 100.0;
        let signal = if just_confirmed(BULL_RUN) {
            TradeSignal::buy(Self::strength(adx, separation))
                .with_meta("alignment_candles", json!(run(BULL_RUN, index)))
        } else if just_confirmed(BEAR_RUN) {
            TradeSignal::sell(Self::strength(adx, separation))
                .with_meta("alignment_candles", json!(run(BEAR_RUN, index)))
        } else {
            return Ok(TradeSignal::hold());
        };
        Ok(signal
            .with_meta("ema_fast", json!(fast))
            .with_meta("ema_medium", json!(medium))
            .with_meta("ema_slow", json!(slow))
            .with_meta("adx", json!(adx))
            .with_meta("separation_pct", json!(separation)))
    }
}
