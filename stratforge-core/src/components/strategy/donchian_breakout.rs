//! Donchian channel breakout, turtle style.
//!
//! BUY when the high breaks the previous bar's `entry_period` channel top,
//! optionally only while the close is above an EMA trend filter. SELL when
//! the low breaks the previous bar's shorter `exit_period` channel bottom.
//! Entries carry ATR-based stop and target levels.

use serde_json::json;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::components::registry::StrategyDescriptor;
use crate::domain::{Bar, ParamSchema, ParamSpec, ParameterSet, TradeSignal};
use crate::error::{ConfigError, StrategyFault};
use crate::indicators::{Atr, Donchian, Ema};

use super::{bar_at, Strategy};

const STRENGTH: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct DonchianBreakout {
    pub entry_period: usize,
    pub exit_period: usize,
    pub atr_stop_multiplier: f64,
    entry_upper: Donchian,
    exit_lower: Donchian,
    trend: Option<Ema>,
    atr: Atr,
    params: ParameterSet,
}

impl DonchianBreakout {
    pub const NAME: &'static str = "donchian_breakout";

    pub fn from_params(params: &ParameterSet) -> Result<Self, ConfigError> {
        let entry_period = params.usize("entry_period")?;
        let exit_period = params.usize("exit_period")?;
        let ema_period = params.usize("ema_filter_period")?;
        let atr_period = params.usize("atr_period")?;
        let atr_stop_multiplier = params.f64("atr_stop_multiplier")?;
        let trend = match params.text("trend_filter")? {
            "ema" => Some(Ema::new(ema_period)),
            "none" => None,
            other => {
                return Err(ConfigError::InvalidParam {
                    name: "trend_filter".into(),
                    reason: format!("expected 'ema' or 'none', got '{other}'"),
                })
            }
        };
        if entry_period < 2 || exit_period < 1 || atr_period < 1 {
            return Err(ConfigError::InvalidParam {
                name: "entry_period".into(),
                reason: "channel and ATR periods must be positive, entry >= 2".into(),
            });
        }
        Ok(Self {
            entry_period,
            exit_period,
            atr_stop_multiplier,
            entry_upper: Donchian::upper(entry_period),
            exit_lower: Donchian::lower(exit_period),
            trend,
            atr: Atr::new(atr_period),
            params: params.clone(),
        })
    }

    pub fn defaults() -> ParameterSet {
        ParameterSet::new()
            .with("entry_period", 20i64)
            .with("exit_period", 10i64)
            .with("ema_filter_period", 50i64)
            .with("atr_period", 14i64)
            .with("atr_stop_multiplier", 2.0)
            .with("trend_filter", "ema")
    }

    pub fn schema() -> ParamSchema {
        ParamSchema::new()
            .with("entry_period", ParamSpec::int(10, 55, "Entry channel period"))
            .with("exit_period", ParamSpec::int(5, 20, "Exit channel period"))
            .with("ema_filter_period", ParamSpec::int(20, 200, "EMA trend filter period"))
            .with("atr_period", ParamSpec::int(7, 21, "ATR period for stops"))
            .with("atr_stop_multiplier", ParamSpec::float(1.0, 4.0, "ATR multiplier for the stop"))
            .with("trend_filter", ParamSpec::choice(&["ema", "none"], "Only buy above the EMA"))
    }

    pub fn descriptor() -> StrategyDescriptor {
        StrategyDescriptor {
            name: Self::NAME,
            description: "Buy on an N-bar high breakout, exit on an M-bar low breakdown",
            default_params: Self::defaults,
            param_schema: Self::schema,
            build: |p| Ok(Box::new(Self::from_params(p)?)),
        }
    }
}

impl Strategy for DonchianBreakout {
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
        let trend = self.trend.as_ref().map_or(0, |e| e.lookback() + 1);
        self.entry_period
            .max(self.exit_period)
            .max(self.atr.lookback() + 1)
            .max(trend)
            + 1
    }

    fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        let mut indicators: Vec<&dyn Indicator> = vec![&self.entry_upper, &self.exit_lower, &self.atr];
        if let Some(ema) = &self.trend {
            indicators.push(ema);
        }
        IndicatorValues::from_indicators(bars, &indicators)
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
        let (Some(channel_top), Some(exit_floor)) = (
            indicators.valid(self.entry_upper.name(), index - 1),
            indicators.valid(self.exit_lower.name(), index - 1),
        ) else {
            return Ok(TradeSignal::hold());
        };
        let uptrend = match &self.trend {
            Some(ema) => match indicators.valid(ema.name(), index) {
                Some(level) => bar.close > level,
                None => return Ok(TradeSignal::hold()),
            },
            None => true,
        };
        let atr = indicators.valid(self.atr.name(), index).unwrap_or(0.0);

        if bar.high > channel_top && uptrend {
            let risk = atr * self.atr_stop_multiplier;
            let mut signal = TradeSignal::buy(STRENGTH)
                .with_meta("type", "channel_breakout")
                .with_meta("breakout_level", json!(channel_top))
                .with_meta("atr", json!(atr));
            if risk > 0.0 {
                signal = signal
                    .with_stop_loss(bar.close - risk)
                    .with_take_profit(bar.close + 2.0 * risk);
            }
            return Ok(signal);
        }
        if bar.low < exit_floor {
            return Ok(TradeSignal::sell(STRENGTH)
                .with_meta("type", "channel_exit")
                .with_meta("exit_level", json!(exit_floor)));
        }
        Ok(TradeSignal::hold())
    }
}
