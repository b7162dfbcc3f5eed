//! Market regime detection and the regime filter.
//!
//! Volatility is checked first (ATR against its rolling mean), then trend
//! strength (ADX) and direction (close against an SMA).

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::components::indicator::{Indicator, IndicatorValues};
use crate::domain::{Bar, Signal, SignalMetadata, TradeSignal};
use crate::error::{ConfigError, StrategyFault};
use crate::indicators::series::rolling_mean;
use crate::indicators::{Adx, Atr, Sma};

use super::{FilterInput, FilterOutcome, SignalFilter};

const KEY_ADX: &str = "regime_adx";
const KEY_MA: &str = "regime_ma";
const KEY_ATR: &str = "regime_atr";
const KEY_AVG_ATR: &str = "regime_avg_atr";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    TrendingBullish,
    TrendingBearish,
    Ranging,
    HighVolatility,
    LowVolatility,
    Unknown,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::TrendingBullish => "trending_bullish",
            MarketRegime::TrendingBearish => "trending_bearish",
            MarketRegime::Ranging => "ranging",
            MarketRegime::HighVolatility => "high_volatility",
            MarketRegime::LowVolatility => "low_volatility",
            MarketRegime::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "trending_bullish" => Ok(MarketRegime::TrendingBullish),
            "trending_bearish" => Ok(MarketRegime::TrendingBearish),
            "ranging" => Ok(MarketRegime::Ranging),
            "high_volatility" => Ok(MarketRegime::HighVolatility),
            "low_volatility" => Ok(MarketRegime::LowVolatility),
            "unknown" => Ok(MarketRegime::Unknown),
            other => Err(ConfigError::InvalidParam {
                name: "regime".into(),
                reason: format!("unknown regime '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeDetector {
    pub adx_period: usize,
    pub adx_threshold: f64,
    pub ma_period: usize,
    pub atr_period: usize,
    pub volatility_lookback: usize,
    pub volatility_high_mult: f64,
    pub volatility_low_mult: f64,
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self {
            adx_period: 14,
            adx_threshold: 25.0,
            ma_period: 50,
            atr_period: 14,
            volatility_lookback: 50,
            volatility_high_mult: 1.5,
            volatility_low_mult: 0.5,
        }
    }
}

impl RegimeDetector {
    pub fn required_history(&self) -> usize {
        self.adx_period
            .max(self.ma_period)
            .max(self.volatility_lookback)
            + 10
    }

    pub fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        let mut iv = IndicatorValues::new();
        let atr = Atr::new(self.atr_period).compute(bars);
        iv.insert(KEY_AVG_ATR, rolling_mean(&atr, self.volatility_lookback));
        iv.insert(KEY_ATR, atr);
        iv.insert(KEY_ADX, Adx::new(self.adx_period).compute(bars));
        iv.insert(KEY_MA, Sma::new(self.ma_period).compute(bars));
        iv
    }

    pub fn detect(&self, bars: &[Bar], index: usize, iv: &IndicatorValues) -> MarketRegime {
        if index < self.required_history() {
            return MarketRegime::Unknown;
        }
        let Some(bar) = bars.get(index) else {
            return MarketRegime::Unknown;
        };
        let (Some(adx), Some(ma), Some(atr)) = (
            iv.valid(KEY_ADX, index),
            iv.valid(KEY_MA, index),
            iv.valid(KEY_ATR, index),
        ) else {
            return MarketRegime::Unknown;
        };

        if let Some(avg_atr) = iv.valid(KEY_AVG_ATR, index).filter(|v| *v > 0.0) {
            if atr > avg_atr * self.volatility_high_mult {
                return MarketRegime::HighVolatility;
            }
            if atr < avg_atr * self.volatility_low_mult {
                return MarketRegime::LowVolatility;
            }
        }

        if adx >= self.adx_threshold {
            if bar.close > ma {
                MarketRegime::TrendingBullish
            } else {
                MarketRegime::TrendingBearish
            }
        } else {
            MarketRegime::Ranging
        }
    }

    fn snapshot(&self, regime: MarketRegime, iv: &IndicatorValues, index: usize) -> SignalMetadata {
        let mut meta = SignalMetadata::new();
        meta.insert("regime".into(), json!(regime.as_str()));
        for key in [KEY_ADX, KEY_ATR, KEY_MA] {
            if let Some(v) = iv.valid(key, index) {
                meta.insert(key.trim_start_matches("regime_").into(), json!(v));
            }
        }
        meta
    }
}

/// Gate signals by market regime.
///
/// `allowed` passes any actionable signal; `long` / `short` restrict BUY and
/// SELL respectively. With no lists configured every signal passes; once any
/// list is set, a signal that matches none of them is blocked.
#[derive(Debug, Clone)]
pub struct RegimeFilter {
    pub detector: RegimeDetector,
    pub allowed: Vec<MarketRegime>,
    pub long: Vec<MarketRegime>,
    pub short: Vec<MarketRegime>,
    pub enabled: bool,
}

impl RegimeFilter {
    pub fn new(detector: RegimeDetector) -> Self {
        Self {
            detector,
            allowed: Vec::new(),
            long: Vec::new(),
            short: Vec::new(),
            enabled: true,
        }
    }

    pub fn allowed(mut self, regimes: Vec<MarketRegime>) -> Self {
        self.allowed = regimes;
        self
    }

    pub fn long_regimes(mut self, regimes: Vec<MarketRegime>) -> Self {
        self.long = regimes;
        self
    }

    pub fn short_regimes(mut self, regimes: Vec<MarketRegime>) -> Self {
        self.short = regimes;
        self
    }

    fn unrestricted(&self) -> bool {
        self.allowed.is_empty() && self.long.is_empty() && self.short.is_empty()
    }
}

impl SignalFilter for RegimeFilter {
    fn name(&self) -> &str {
        "regime"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn required_history(&self) -> usize {
        self.detector.required_history()
    }

    fn precompute(&self, bars: &[Bar]) -> IndicatorValues {
        self.detector.precompute(bars)
    }

    fn apply(
        &self,
        signal: &TradeSignal,
        input: &FilterInput<'_>,
    ) -> Result<FilterOutcome, StrategyFault> {
        let regime = self
            .detector
            .detect(input.bars, input.index, input.indicators);
        let meta = self.detector.snapshot(regime, input.indicators, input.index);

        if self.unrestricted() || self.allowed.contains(&regime) {
            return Ok(FilterOutcome::pass_with(meta));
        }
        let (list, label) = match signal.signal {
            Signal::Buy => (&self.long, "BUY"),
            Signal::Sell => (&self.short, "SELL"),
            Signal::Hold => return Ok(FilterOutcome::pass_with(meta)),
        };
        if list.contains(&regime) {
            return Ok(FilterOutcome::pass_with(meta));
        }
        Ok(FilterOutcome::block(
            format!("{label} not allowed in {regime} regime"),
            meta,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::filter::FilterContext;
    use crate::indicators::make_bars;

    fn trending_up(n: usize) -> Vec<Bar> {
        let closes: Vec<f64> = (0..n).map(|i| 100.0 * 1.01f64.powi(i as i32)).collect();
        make_bars(&closes)
    }

    fn outcome(filter: &RegimeFilter, bars: &[Bar], signal: TradeSignal) -> FilterOutcome {
        let iv = filter.precompute(bars);
        let ctx = FilterContext::new();
        let input = FilterInput {
            bars,
            index: bars.len() - 1,
            indicators: &iv,
            context: &ctx,
        };
        filter.apply(&signal, &input).unwrap()
    }

    #[test]
    fn steady_uptrend_is_bullish() {
        let bars = trending_up(120);
        let d = RegimeDetector::default();
        let iv = d.precompute(&bars);
        assert_eq!(d.detect(&bars, 119, &iv), MarketRegime::TrendingBullish);
    }

    #[test]
    fn unknown_before_required_history() {
        let bars = trending_up(120);
        let d = RegimeDetector::default();
        let iv = d.precompute(&bars);
        assert_eq!(d.required_history(), 60);
        assert_eq!(d.detect(&bars, 30, &iv), MarketRegime::Unknown);
    }

    #[test]
    fn long_only_in_bullish() {
        let bars = trending_up(120);
        let f = RegimeFilter::new(RegimeDetector::default())
            .long_regimes(vec![MarketRegime::TrendingBullish])
            .short_regimes(vec![MarketRegime::TrendingBearish]);
        assert!(outcome(&f, &bars, TradeSignal::buy(1.0)).is_pass());
        let blocked = outcome(&f, &bars, TradeSignal::sell(1.0));
        match blocked {
            FilterOutcome::Block { reason, metadata } => {
                assert!(reason.contains("SELL not allowed in trending_bullish"));
                assert_eq!(metadata.get("regime"), Some(&json!("trending_bullish")));
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn unrestricted_passes_everything() {
        let bars = trending_up(80);
        let f = RegimeFilter::new(RegimeDetector::default());
        assert!(outcome(&f, &bars, TradeSignal::sell(1.0)).is_pass());
    }

    #[test]
    fn restricted_default_denies() {
        let bars = trending_up(120);
        let f = RegimeFilter::new(RegimeDetector::default()).allowed(vec![MarketRegime::Ranging]);
        assert!(!outcome(&f, &bars, TradeSignal::buy(1.0)).is_pass());
    }

    #[test]
    fn regime_names_roundtrip() {
        for r in [
            MarketRegime::TrendingBullish,
            MarketRegime::Ranging,
            MarketRegime::LowVolatility,
        ] {
            assert_eq!(MarketRegime::parse(r.as_str()).unwrap(), r);
        }
        assert!(MarketRegime::parse("sideways").is_err());
    }
}
