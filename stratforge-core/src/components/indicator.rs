//! Indicator trait and precomputed indicator values container.
//!
//! Indicators are pure functions: bar history in, numeric series out.
//! Strategies and filters precompute them once per run and read them by bar
//! index while the engine replays the series.

use crate::domain::Bar;
use std::collections::HashMap;

/// Trait for indicators.
///
/// Indicators take a full bar series and produce a numeric output series of
/// the same length. Values before `lookback()` are `f64::NAN` (warmup).
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on bar t+1 or later. Every indicator must
/// give the same value at t on a truncated series as on the full one.
pub trait Indicator: Send + Sync {
    /// Column name (e.g., "sma_20", "atr_14").
    fn name(&self) -> &str;

    /// Index of the first valid output.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Named derived columns, built once before the bar loop.
#[derive(Debug, Clone, Default)]
pub struct IndicatorValues {
    series: HashMap<String, Vec<f64>>,
}

impl IndicatorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute every indicator over `bars` and store it under its name.
    pub fn from_indicators(bars: &[Bar], indicators: &[&dyn Indicator]) -> Self {
        let mut iv = Self::new();
        for ind in indicators {
            iv.insert(ind.name(), ind.compute(bars));
        }
        iv
    }

    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.series.insert(name.into(), values);
    }

    /// Raw value at `bar_index`, NaN included.
    pub fn get(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.series
            .get(name)
            .and_then(|v| v.get(bar_index).copied())
    }

    /// Value at `bar_index` only if present and finite.
    pub fn valid(&self, name: &str, bar_index: usize) -> Option<f64> {
        self.get(name, bar_index).filter(|v| v.is_finite())
    }

    pub fn get_series(&self, name: &str) -> Option<&[f64]> {
        self.series.get(name).map(|v| v.as_slice())
    }

    /// Move all columns of `other` into `self`; later names win.
    pub fn extend(&mut self, other: IndicatorValues) {
        self.series.extend(other.series);
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_values_insert_and_get() {
        let mut iv = IndicatorValues::new();
        iv.insert("sma_3", vec![f64::NAN, f64::NAN, 100.0, 101.0]);
        assert!(iv.get("sma_3", 0).unwrap().is_nan());
        assert_eq!(iv.valid("sma_3", 0), None);
        assert_eq!(iv.valid("sma_3", 2), Some(100.0));
        assert_eq!(iv.get("sma_3", 4), None);
        assert_eq!(iv.get("missing", 0), None);
    }

    #[test]
    fn extend_merges_columns() {
        let mut a = IndicatorValues::new();
        a.insert("x", vec![1.0]);
        let mut b = IndicatorValues::new();
        b.insert("y", vec![2.0]);
        a.extend(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.valid("y", 0), Some(2.0));
    }
}
