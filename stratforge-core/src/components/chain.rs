//! Filter chain — logical AND over an ordered list of filters.

use serde_json::Value;
use tracing::debug;

use crate::domain::{Bar, TradeSignal};
use crate::error::{ConfigError, StrategyFault};

use super::factory::{create_filter, FilterConfig};
use super::filter::{FilterContext, FilterInput, FilterOutcome, SignalFilter};
use super::indicator::IndicatorValues;

#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn SignalFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[FilterConfig]) -> Result<Self, ConfigError> {
        let mut chain = Self::new();
        for config in configs {
            chain.push(create_filter(config)?);
        }
        Ok(chain)
    }

    pub fn push(&mut self, filter: Box<dyn SignalFilter>) {
        self.filters.push(filter);
    }

    pub fn with(mut self, filter: Box<dyn SignalFilter>) -> Self {
        self.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Max history over enabled filters.
    pub fn required_history(&self) -> usize {
        self.enabled()
            .map(|(_, f)| f.required_history())
            .max()
            .unwrap_or(0)
    }

    /// One column set per filter, aligned with the chain order.
    pub fn precompute(&self, bars: &[Bar]) -> Vec<IndicatorValues> {
        self.filters
            .iter()
            .map(|f| {
                if f.is_enabled() {
                    f.precompute(bars)
                } else {
                    IndicatorValues::new()
                }
            })
            .collect()
    }

    fn enabled(&self) -> impl Iterator<Item = (usize, &Box<dyn SignalFilter>)> {
        self.filters.iter().enumerate().filter(|(_, f)| f.is_enabled())
    }

    /// Run `signal` through every enabled filter in order.
    ///
    /// HOLD bypasses the chain. The first Block returns a HOLD that records
    /// the reason; Pass metadata is merged under `"{filter}.{key}"`.
    pub fn apply(
        &self,
        signal: TradeSignal,
        bars: &[Bar],
        index: usize,
        precomputed: &[IndicatorValues],
        context: &FilterContext,
    ) -> Result<TradeSignal, StrategyFault> {
        if !signal.is_actionable() {
            return Ok(signal);
        }
        let empty = IndicatorValues::new();
        let mut signal = signal;
        for (i, filter) in self.enabled() {
            let input = FilterInput {
                bars,
                index,
                indicators: precomputed.get(i).unwrap_or(&empty),
                context,
            };
            match filter.apply(&signal, &input)? {
                FilterOutcome::Pass { metadata } => {
                    for (k, v) in metadata {
                        signal.metadata.insert(format!("{}.{k}", filter.name()), v);
                    }
                }
                FilterOutcome::Block { reason, metadata } => {
                    debug!(filter = filter.name(), bar = index, %reason, "signal blocked");
                    let mut blocked = signal.blocked(reason);
                    blocked
                        .metadata
                        .insert("blocked_by".into(), Value::String(filter.name().to_string()));
                    for (k, v) in metadata {
                        blocked.metadata.insert(format!("{}.{k}", filter.name()), v);
                    }
                    return Ok(blocked);
                }
            }
        }
        Ok(signal)
    }
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}
