//! Multi-timeframe confirmation filter.
//!
//! For each configured higher timeframe, classify the trend (close vs SMA and
//! SMA slope) and require enough timeframes to agree with the signal.
//!
//! # Look-ahead guard
//! Only higher-timeframe bars that have fully closed by the current base bar
//! are visible: a bar stamped `t` with duration `d` is used once `t + d` is at
//! or before the current timestamp. Labels with no known duration fall back
//! to `t <= current timestamp`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::{timeframe_duration, Bar, Signal, SignalMetadata, TradeSignal};
use crate::error::StrategyFault;

use super::{FilterInput, FilterOutcome, SignalFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
    Unknown,
}

impl TrendDirection {
    fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Bullish => "bullish",
            TrendDirection::Bearish => "bearish",
            TrendDirection::Neutral => "neutral",
            TrendDirection::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultiTimeframeFilter {
    pub timeframes: Vec<String>,
    pub require_all: bool,
    pub min_confirmations: usize,
    pub ma_period: usize,
    pub trend_strength_period: usize,
    pub enabled: bool,
}

impl MultiTimeframeFilter {
    pub fn new(timeframes: Vec<String>) -> Self {
        Self {
            timeframes,
            require_all: false,
            min_confirmations: 1,
            ma_period: 20,
            trend_strength_period: 10,
            enabled: true,
        }
    }

    fn min_bars(&self) -> usize {
        self.ma_period + self.trend_strength_period + 5
    }

    fn required_confirmations(&self) -> usize {
        if self.require_all {
            self.timeframes.len()
        } else {
            self.min_confirmations
        }
    }

    /// Number of bars in `series` visible at `now`.
    fn visible(label: &str, series: &[Bar], now: DateTime<Utc>) -> usize {
        match timeframe_duration(label) {
            Some(d) => series.partition_point(|b| b.timestamp + d <= now),
            None => series.partition_point(|b| b.timestamp <= now),
        }
    }

    /// Trend of the last bar of `series`.
    pub fn trend(&self, series: &[Bar]) -> TrendDirection {
        if series.len() < self.min_bars() {
            return TrendDirection::Unknown;
        }
        let last = series.len() - 1;
        let (Some(ma), Some(ma_then)) = (
            sma_at(series, last, self.ma_period),
            sma_at(series, last - self.trend_strength_period, self.ma_period),
        ) else {
            return TrendDirection::Unknown;
        };
        let close = series[last].close;
        let slope = ma - ma_then;

        let mut bullish = 0;
        let mut bearish = 0;
        if close > ma {
            bullish += 1;
        } else {
            bearish += 1;
        }
        if slope > 0.0 {
            bullish += 1;
        } else if slope < 0.0 {
            bearish += 1;
        }
        match bullish.cmp(&bearish) {
            std::cmp::Ordering::Greater => TrendDirection::Bullish,
            std::cmp::Ordering::Less => TrendDirection::Bearish,
            std::cmp::Ordering::Equal => TrendDirection::Neutral,
        }
    }
}

fn sma_at(series: &[Bar], end: usize, period: usize) -> Option<f64> {
    if period == 0 || end + 1 < period {
        return None;
    }
    let window = &series[end + 1 - period..=end];
    let sum: f64 = window.iter().map(|b| b.close).sum();
    let mean = sum / period as f64;
    mean.is_finite().then_some(mean)
}

impl SignalFilter for MultiTimeframeFilter {
    fn name(&self) -> &str {
        "multi_timeframe"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn required_history(&self) -> usize {
        self.min_bars()
    }

    fn apply(
        &self,
        signal: &TradeSignal,
        input: &FilterInput<'_>,
    ) -> Result<FilterOutcome, StrategyFault> {
        let higher = &input.context.higher_timeframes;
        if higher.is_empty() {
            let mut meta = SignalMetadata::new();
            meta.insert("warning".into(), json!("no higher timeframe data"));
            return Ok(FilterOutcome::pass_with(meta));
        }
        let Some(bar) = input.bar() else {
            return Err(StrategyFault::new(
                self.name(),
                input.index,
                "bar index out of range",
            ));
        };

        let mut confirmations = 0;
        let mut analysis = Map::new();
        for label in &self.timeframes {
            let Some(series) = higher.get(label) else {
                analysis.insert(label.clone(), Value::String("no_data".into()));
                continue;
            };
            let n = Self::visible(label, series, bar.timestamp);
            let trend = self.trend(&series[..n]);
            analysis.insert(label.clone(), Value::String(trend.as_str().into()));
            let confirms = matches!(
                (signal.signal, trend),
                (Signal::Buy, TrendDirection::Bullish) | (Signal::Sell, TrendDirection::Bearish)
            );
            if confirms {
                confirmations += 1;
            }
        }

        let required = self.required_confirmations();
        let mut meta = SignalMetadata::new();
        meta.insert("confirmations".into(), json!(confirmations));
        meta.insert("required".into(), json!(required));
        meta.insert("timeframes".into(), Value::Object(analysis));

        if confirmations >= required {
            Ok(FilterOutcome::pass_with(meta))
        } else {
            Ok(FilterOutcome::block(
                format!("only {confirmations}/{required} timeframes confirm"),
                meta,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::filter::FilterContext;
    use crate::components::indicator::IndicatorValues;
    use chrono::{Duration, TimeZone};

    fn hourly(closes: &[f64]) -> Vec<Bar> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(t0 + Duration::hours(i as i64), c, c * 1.01, c * 0.99, c, 10.0))
            .collect()
    }

    fn apply(filter: &MultiTimeframeFilter, ctx: &FilterContext, bars: &[Bar], signal: TradeSignal) -> FilterOutcome {
        let iv = IndicatorValues::new();
        let input = FilterInput {
            bars,
            index: bars.len() - 1,
            indicators: &iv,
            context: ctx,
        };
        filter.apply(&signal, &input).unwrap()
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn confirms_buy_in_higher_uptrend() {
        let base = hourly(&rising(24 * 60));
        let ctx = FilterContext::new().with_resampled(&base, &["1d".to_string()]);
        let f = MultiTimeframeFilter::new(vec!["1d".into()]);
        assert!(apply(&f, &ctx, &base, TradeSignal::buy(1.0)).is_pass());
        assert!(!apply(&f, &ctx, &base, TradeSignal::sell(1.0)).is_pass());
    }

    #[test]
    fn missing_context_passes_with_warning() {
        let base = hourly(&rising(50));
        let f = MultiTimeframeFilter::new(vec!["4h".into()]);
        match apply(&f, &FilterContext::new(), &base, TradeSignal::sell(1.0)) {
            FilterOutcome::Pass { metadata } => assert!(metadata.contains_key("warning")),
            other => panic!("expected pass, got {other:?}"),
        }
    }

    #[test]
    fn unfinished_higher_bars_are_invisible() {
        // Daily bars stamped at midnight; at 12:00 on day k only days < k are closed.
        let base = hourly(&rising(24 * 3));
        let daily = crate::domain::resample(&base, 24 * 60);
        let noon = base[24 * 2 + 12].timestamp;
        assert_eq!(MultiTimeframeFilter::visible("1d", &daily, noon), 2);
        assert_eq!(MultiTimeframeFilter::visible("weird", &daily, noon), 3);
    }

    #[test]
    fn too_little_higher_data_does_not_confirm() {
        let base = hourly(&rising(24 * 5));
        let ctx = FilterContext::new().with_resampled(&base, &["1d".to_string()]);
        let f = MultiTimeframeFilter::new(vec!["1d".into()]);
        assert!(!apply(&f, &ctx, &base, TradeSignal::buy(1.0)).is_pass());
    }

    #[test]
    fn require_all_counts_every_timeframe() {
        let base = hourly(&rising(24 * 60));
        let ctx = FilterContext::new().with_resampled(&base, &["4h".to_string(), "1d".to_string()]);
        let mut f = MultiTimeframeFilter::new(vec!["4h".into(), "1d".into(), "1w".into()]);
        f.require_all = true;
        assert!(!apply(&f, &ctx, &base, TradeSignal::buy(1.0)).is_pass());
        f.require_all = false;
        f.min_confirmations = 2;
        assert!(apply(&f, &ctx, &base, TradeSignal::buy(1.0)).is_pass());
    }
}
