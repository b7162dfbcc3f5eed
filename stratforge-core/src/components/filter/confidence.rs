//! Learned-confidence filter.
//!
//! Builds a fixed feature vector for the current bar and asks the context's
//! `SignalScorer` how likely the signal is to work out. Signals scoring below
//! `confidence_threshold` are blocked. Without a scorer every signal passes.

use serde_json::json;

use crate::domain::{Bar, SignalMetadata, TradeSignal};
use crate::error::StrategyFault;

use super::{FilterInput, FilterOutcome, SignalFilter};

pub const FEATURE_COUNT: usize = 8;

/// Features for `bars[index]` over a trailing `lookback` window:
/// `[ret_1, ret_5, ret_10, volatility, volume_ratio, range_ratio, rsi / 100, bb_width]`.
///
/// Returns `None` until `lookback` bars of history exist.
pub fn confidence_features(bars: &[Bar], index: usize, lookback: usize) -> Option<[f64; FEATURE_COUNT]> {
    if index < lookback || index >= bars.len() || lookback < 11 {
        return None;
    }
    let window = &bars[index - lookback..=index];
    let close: Vec<f64> = window.iter().map(|b| b.close).collect();
    let last = close[close.len() - 1];

    let ret = |k: usize| {
        let base = close[close.len() - 1 - k];
        if base != 0.0 {
            last / base - 1.0
        } else {
            0.0
        }
    };

    let returns: Vec<f64> = close
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect();
    let volatility = population_std(&returns);

    let volumes: Vec<f64> = window.iter().map(|b| b.volume).collect();
    let prior = &volumes[..volumes.len() - 1];
    let avg_volume = prior.iter().sum::<f64>() / prior.len() as f64;
    let volume_ratio = if avg_volume > 0.0 {
        volumes[volumes.len() - 1] / avg_volume
    } else {
        1.0
    };

    let ranges: Vec<f64> = window.iter().map(|b| b.high - b.low).collect();
    let tail = &ranges[ranges.len().saturating_sub(14)..];
    let avg_range = tail.iter().sum::<f64>() / tail.len() as f64;
    let range_ratio = if last > 0.0 { avg_range / last } else { 0.0 };

    let deltas: Vec<f64> = close.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &deltas[deltas.len().saturating_sub(14)..];
    let gain = recent.iter().map(|d| d.max(0.0)).sum::<f64>() / recent.len() as f64;
    let loss = recent.iter().map(|d| (-d).max(0.0)).sum::<f64>() / recent.len() as f64;
    let rsi = 100.0 - 100.0 / (1.0 + gain / (loss + 1e-10));

    let tail20 = &close[close.len().saturating_sub(20)..];
    let mean20 = tail20.iter().sum::<f64>() / tail20.len() as f64;
    let bb_width = if mean20 > 0.0 {
        2.0 * population_std(tail20) / mean20
    } else {
        0.0
    };

    let features = [
        ret(1),
        ret(5),
        ret(10),
        volatility,
        volume_ratio,
        range_ratio,
        rsi / 100.0,
        bb_width,
    ];
    features.iter().all(|f| f.is_finite()).then_some(features)
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

#[derive(Debug, Clone)]
pub struct ConfidenceFilter {
    pub confidence_threshold: f64,
    pub lookback: usize,
    pub enabled: bool,
}

impl Default for ConfidenceFilter {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.55,
            lookback: 20,
            enabled: true,
        }
    }
}

impl SignalFilter for ConfidenceFilter {
    fn name(&self) -> &str {
        "confidence"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn required_history(&self) -> usize {
        self.lookback + 5
    }

    fn apply(
        &self,
        _signal: &TradeSignal,
        input: &FilterInput<'_>,
    ) -> Result<FilterOutcome, StrategyFault> {
        let Some(scorer) = input.context.scorer.as_ref() else {
            return Ok(FilterOutcome::pass());
        };
        let mut meta = SignalMetadata::new();
        let Some(features) = confidence_features(input.bars, input.index, self.lookback) else {
            meta.insert("note".into(), json!("insufficient_history"));
            return Ok(FilterOutcome::pass_with(meta));
        };
        let Some(confidence) = scorer.score(&features).filter(|p| p.is_finite()) else {
            return Err(StrategyFault::new(
                self.name(),
                input.index,
                "scorer returned no probability",
            ));
        };
        meta.insert("confidence".into(), json!(confidence));
        if confidence >= self.confidence_threshold {
            Ok(FilterOutcome::pass_with(meta))
        } else {
            Ok(FilterOutcome::block(
                format!(
                    "confidence {confidence:.2} < {:.2}",
                    self.confidence_threshold
                ),
                meta,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::filter::{FilterContext, SignalScorer};
    use crate::components::indicator::IndicatorValues;
    use crate::indicators::make_bars;
    use std::sync::Arc;

    /// Scores by the sign of the 5-bar return.
    struct MomentumScorer;

    impl SignalScorer for MomentumScorer {
        fn score(&self, features: &[f64]) -> Option<f64> {
            Some(if features[1] > 0.0 { 0.8 } else { 0.2 })
        }
    }

    fn outcome(ctx: &FilterContext, closes: &[f64]) -> FilterOutcome {
        let bars = make_bars(closes);
        let iv = IndicatorValues::new();
        let input = FilterInput {
            bars: &bars,
            index: bars.len() - 1,
            indicators: &iv,
            context: ctx,
        };
        ConfidenceFilter::default()
            .apply(&TradeSignal::buy(1.0), &input)
            .unwrap()
    }

    #[test]
    fn features_have_fixed_width_and_no_lookahead() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64).sin()).collect();
        let bars = make_bars(&closes);
        let full = confidence_features(&bars, 30, 20).unwrap();
        let cut = confidence_features(&bars[..31], 30, 20).unwrap();
        assert_eq!(full, cut);
        assert_eq!(full.len(), FEATURE_COUNT);
        assert!(confidence_features(&bars, 10, 20).is_none());
    }

    #[test]
    fn no_scorer_passes() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert!(outcome(&FilterContext::new(), &closes).is_pass());
    }

    #[test]
    fn scorer_gates_on_threshold() {
        let ctx = FilterContext::new().with_scorer(Arc::new(MomentumScorer));
        let up: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let down: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert!(outcome(&ctx, &up).is_pass());
        assert!(!outcome(&ctx, &down).is_pass());
    }
}
