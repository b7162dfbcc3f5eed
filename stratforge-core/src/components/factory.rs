//! Factory system — converts `FilterConfig` into runtime filter objects.
//!
//! Strategies are built through the `StrategyRegistry`; filters through
//! `create_filter`, which `FilterChain::from_configs` calls in order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

use super::filter::{
    ConfidenceFilter, MarketRegime, MultiTimeframeFilter, RegimeDetector, RegimeFilter,
    SentimentFilter, SignalFilter,
};

/// Declarative filter entry, e.g. a `[[filters]]` table in a run config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub filter_type: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

fn enabled_by_default() -> bool {
    true
}

impl FilterConfig {
    pub fn new(filter_type: impl Into<String>) -> Self {
        Self {
            filter_type: filter_type.into(),
            enabled: true,
            params: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Extract a named f64 parameter, falling back to `default`.
fn param(config: &FilterConfig, name: &str, default: f64) -> Result<f64, ConfigError> {
    match config.params.get(name) {
        None => Ok(default),
        Some(v) => v.as_f64().ok_or_else(|| invalid(name, "expected a number")),
    }
}

/// Extract a named usize parameter, falling back to `default`.
fn param_usize(config: &FilterConfig, name: &str, default: usize) -> Result<usize, ConfigError> {
    match config.params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| invalid(name, "expected a non-negative integer")),
    }
}

fn param_bool(config: &FilterConfig, name: &str, default: bool) -> Result<bool, ConfigError> {
    match config.params.get(name) {
        None => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| invalid(name, "expected a boolean")),
    }
}

fn param_list(config: &FilterConfig, name: &str) -> Result<Vec<String>, ConfigError> {
    match config.params.get(name) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| invalid(name, "expected a list of strings"))
            })
            .collect(),
        Some(_) => Err(invalid(name, "expected a list of strings")),
    }
}

fn regimes(config: &FilterConfig, name: &str) -> Result<Vec<MarketRegime>, ConfigError> {
    param_list(config, name)?
        .iter()
        .map(|s| MarketRegime::parse(s))
        .collect()
}

fn invalid(name: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidParam {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

// ─── Filter factory ──────────────────────────────────────────────────

/// Create a filter from a `FilterConfig`.
///
/// The sentiment filter is built without a source; attach one with
/// `SentimentFilter::with_source` or supply `FilterContext::external_score`.
pub fn create_filter(config: &FilterConfig) -> Result<Box<dyn SignalFilter>, ConfigError> {
    let enabled = config.enabled;
    match config.filter_type.as_str() {
        "regime" => {
            let defaults = RegimeDetector::default();
            let detector = RegimeDetector {
                adx_period: param_usize(config, "adx_period", defaults.adx_period)?,
                adx_threshold: param(config, "adx_threshold", defaults.adx_threshold)?,
                ma_period: param_usize(config, "ma_period", defaults.ma_period)?,
                atr_period: param_usize(config, "atr_period", defaults.atr_period)?,
                volatility_lookback: param_usize(
                    config,
                    "volatility_lookback",
                    defaults.volatility_lookback,
                )?,
                volatility_high_mult: param(
                    config,
                    "volatility_high_mult",
                    defaults.volatility_high_mult,
                )?,
                volatility_low_mult: param(
                    config,
                    "volatility_low_mult",
                    defaults.volatility_low_mult,
                )?,
            };
            let mut filter = RegimeFilter::new(detector)
                .allowed(regimes(config, "allowed_regimes")?)
                .long_regimes(regimes(config, "long_regimes")?)
                .short_regimes(regimes(config, "short_regimes")?);
            filter.enabled = enabled;
            Ok(Box::new(filter))
        }
        "multi_timeframe" => {
            let timeframes = param_list(config, "timeframes")?;
            if timeframes.is_empty() {
                return Err(invalid("timeframes", "at least one timeframe is required"));
            }
            let mut filter = MultiTimeframeFilter::new(timeframes);
            filter.require_all = param_bool(config, "require_all", false)?;
            filter.min_confirmations = param_usize(config, "min_confirmations", 1)?;
            filter.ma_period = param_usize(config, "ma_period", 20)?;
            filter.trend_strength_period = param_usize(config, "trend_strength_period", 10)?;
            filter.enabled = enabled;
            Ok(Box::new(filter))
        }
        "confidence" => {
            let threshold = param(config, "confidence_threshold", 0.55)?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(invalid("confidence_threshold", "must lie in [0, 1]"));
            }
            Ok(Box::new(ConfidenceFilter {
                confidence_threshold: threshold,
                lookback: param_usize(config, "lookback", 20)?.max(11),
                enabled,
            }))
        }
        "sentiment" => {
            let ttl_minutes = param(config, "cache_ttl_minutes", 30.0)?;
            let mut filter = SentimentFilter::default();
            filter.fear_threshold = param(config, "fear_threshold", 25.0)?;
            filter.greed_threshold = param(config, "greed_threshold", 75.0)?;
            filter.news_weight = param(config, "news_sentiment_weight", 0.3)?.clamp(0.0, 1.0);
            filter.contrarian = param_bool(config, "contrarian", false)?;
            filter.enabled = enabled;
            Ok(Box::new(filter.with_ttl(std::time::Duration::from_secs_f64(
                ttl_minutes.max(0.0) * 60.0,
            ))))
        }
        other => Err(ConfigError::UnknownFilter(other.to_string())),
    }
}
