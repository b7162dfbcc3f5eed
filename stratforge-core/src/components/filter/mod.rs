//! Signal filters — ordered, composable post-processors of strategy output.
//!
//! A filter receives the current `TradeSignal` plus read-only run context and
//! either passes it (optionally annotating metadata) or blocks it. Filters
//! never upgrade HOLD to BUY/SELL; the chain does not even call them for HOLD.
//!
//! # Architecture invariant
//! Filters must not reference ledger state. They evaluate market conditions
//! and auxiliary data only.

pub mod confidence;
pub mod multi_timeframe;
pub mod regime;
pub mod sentiment;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{resample, timeframe_minutes, Bar, SignalMetadata, TradeSignal};
use crate::error::StrategyFault;

use super::indicator::IndicatorValues;

pub use confidence::{confidence_features, ConfidenceFilter, FEATURE_COUNT};
pub use multi_timeframe::{MultiTimeframeFilter, TrendDirection};
pub use regime::{MarketRegime, RegimeDetector, RegimeFilter};
pub use sentiment::{SentimentFilter, SentimentReading, SentimentSource};

/// Verdict of one filter for one signal.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOutcome {
    Pass { metadata: SignalMetadata },
    Block { reason: String, metadata: SignalMetadata },
}

impl FilterOutcome {
    pub fn pass() -> Self {
        FilterOutcome::Pass {
            metadata: SignalMetadata::new(),
        }
    }

    pub fn pass_with(metadata: SignalMetadata) -> Self {
        FilterOutcome::Pass { metadata }
    }

    pub fn block(reason: impl Into<String>, metadata: SignalMetadata) -> Self {
        FilterOutcome::Block {
            reason: reason.into(),
            metadata,
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, FilterOutcome::Pass { .. })
    }
}

/// Learned-confidence model handle: features in, probability in [0, 1] out.
pub trait SignalScorer: Send + Sync {
    fn score(&self, features: &[f64]) -> Option<f64>;
}

/// Read-only auxiliary data, fixed for the whole run.
#[derive(Clone, Default)]
pub struct FilterContext {
    /// Higher-timeframe series keyed by label ("4h", "1d", ...).
    pub higher_timeframes: BTreeMap<String, Vec<Bar>>,
    /// External sentiment reading on the 0–100 fear/greed scale.
    pub external_score: Option<f64>,
    pub scorer: Option<Arc<dyn SignalScorer>>,
}

impl FilterContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeframe(mut self, label: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.higher_timeframes.insert(label.into(), bars);
        self
    }

    /// Add higher-timeframe series built by resampling `base`.
    /// Unrecognised labels are skipped.
    pub fn with_resampled(mut self, base: &[Bar], labels: &[String]) -> Self {
        for label in labels {
            if let Some(minutes) = timeframe_minutes(label) {
                self.higher_timeframes
                    .insert(label.clone(), resample(base, minutes));
            }
        }
        self
    }

    pub fn with_external_score(mut self, score: f64) -> Self {
        self.external_score = Some(score);
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn SignalScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }
}

impl std::fmt::Debug for FilterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterContext")
            .field("higher_timeframes", &self.higher_timeframes.keys().collect::<Vec<_>>())
            .field("external_score", &self.external_score)
            .field("scorer", &self.scorer.is_some())
            .finish()
    }
}

/// Everything a filter may look at for one bar.
#[derive(Debug, Clone, Copy)]
pub struct FilterInput<'a> {
    pub bars: &'a [Bar],
    pub index: usize,
    /// The filter's own precomputed columns.
    pub indicators: &'a IndicatorValues,
    pub context: &'a FilterContext,
}

impl<'a> FilterInput<'a> {
    pub fn bar(&self) -> Option<&'a Bar> {
        self.bars.get(self.index)
    }
}

/// Trait for signal filters.
pub trait SignalFilter: Send + Sync {
    /// Human-readable name (e.g., "regime", "multi_timeframe").
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool {
        true
    }

    fn required_history(&self) -> usize {
        0
    }

    fn precompute(&self, _bars: &[Bar]) -> IndicatorValues {
        IndicatorValues::new()
    }

    /// Decide whether an actionable `signal` may proceed.
    fn apply(&self, signal: &TradeSignal, input: &FilterInput<'_>)
        -> Result<FilterOutcome, StrategyFault>;
}
