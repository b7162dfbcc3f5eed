//! Serializable run configuration, loaded from TOML.
//!
//! ```toml
//! [strategy]
//! name = "ma_crossover"
//! params = { fast_period = 9, slow_period = 21 }
//!
//! [[filters]]
//! type = "regime"
//! allowed_regimes = ["trending_bullish", "trending_bearish"]
//!
//! [backtest]
//! initial_capital = 10000.0
//! fee_percent = 0.1
//!
//! [optimizer]
//! n_trials = 200
//! metric = "sharpe_ratio"
//! sampler = "random"   # or "grid"
//! ```
//!
//! Every section except `[strategy]` is optional and falls back to defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use stratforge_core::components::{FilterChain, FilterConfig, FilterContext, StrategyRegistry};
use stratforge_core::domain::{Bar, ParameterSet};
use stratforge_core::engine::BacktestConfig;
use stratforge_core::error::ConfigError;
use thiserror::Error;

use crate::experiment::Experiment;
use crate::oos::OosConfig;
use crate::optimizer::{AdaptiveConfig, OptimizerConfig};
use crate::walk_forward::WalkForwardConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySection {
    pub name: String,
    #[serde(default)]
    pub params: ParameterSet,
}

/// Run-wide filter context. Higher-timeframe series are resampled from the
/// base series by label ("4h", "1d", ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    pub higher_timeframes: Vec<String>,
    /// Fear/greed reading on the 0–100 scale.
    pub external_score: Option<f64>,
}

impl ContextSection {
    pub fn build(&self, bars: &[Bar]) -> FilterContext {
        let context = FilterContext::new().with_resampled(bars, &self.higher_timeframes);
        match self.external_score {
            Some(score) => context.with_external_score(score),
            None => context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub strategy: StrategySection,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    #[serde(default)]
    pub walk_forward: WalkForwardConfig,
    #[serde(default)]
    pub oos: OosConfig,
}

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML")]
    Parse(#[from] toml::de::Error),
    #[error("invalid run configuration")]
    Invalid(#[from] ConfigError),
}

impl RunConfig {
    /// A configuration running `strategy` with defaults everywhere else.
    pub fn for_strategy(strategy: impl Into<String>) -> Self {
        Self {
            strategy: StrategySection {
                name: strategy.into(),
                params: ParameterSet::new(),
            },
            filters: Vec::new(),
            context: ContextSection::default(),
            backtest: BacktestConfig::default(),
            optimizer: OptimizerConfig::default(),
            adaptive: AdaptiveConfig::default(),
            walk_forward: WalkForwardConfig::default(),
            oos: OosConfig::default(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RunConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RunConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check the strategy name, its parameters, the filter chain and the
    /// engine settings against `registry`.
    pub fn validate(&self, registry: &StrategyRegistry) -> Result<(), RunConfigError> {
        let descriptor = registry.get(&self.strategy.name)?;
        descriptor.param_schema().validate(&self.strategy.params)?;
        FilterChain::from_configs(&self.filters)?;
        self.backtest.validate()?;
        Ok(())
    }

    /// Resolve into an `Experiment` over `bars` (used to resample
    /// higher-timeframe context).
    pub fn experiment(
        &self,
        registry: &StrategyRegistry,
        bars: &[Bar],
    ) -> Result<Experiment, RunConfigError> {
        self.validate(registry)?;
        let descriptor = registry.get(&self.strategy.name)?;
        Ok(Experiment::new(*descriptor)
            .with_params(self.strategy.params.clone())
            .with_filters(self.filters.clone())
            .with_context(self.context.build(bars))
            .with_backtest(self.backtest.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitness::FitnessMetric;
    use std::io::Write;

    const SAMPLE: &str = r#"
[strategy]
name = "ma_crossover"
params = { fast_period = 5, slow_period = 30 }

[[filters]]
type = "regime"
adx_threshold = 20.0

[[filters]]
type = "confidence"
enabled = false
confidence_threshold = 0.7

[context]
higher_timeframes = ["1w"]

[backtest]
initial_capital = 5000.0
allow_short = false

[optimizer]
n_trials = 50
metric = "sortino_ratio"
direction = "maximize"

[walk_forward]
n_splits = 4
"#;

    #[test]
    fn parses_full_document() {
        let cfg = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.strategy.name, "ma_crossover");
        assert_eq!(cfg.strategy.params.usize("slow_period").unwrap(), 30);
        assert_eq!(cfg.filters.len(), 2);
        assert!(!cfg.filters[1].enabled);
        assert_eq!(cfg.backtest.initial_capital, 5000.0);
        assert!(!cfg.backtest.allow_short);
        assert_eq!(cfg.backtest.fee_percent, BacktestConfig::default().fee_percent);
        assert_eq!(cfg.optimizer.metric, FitnessMetric::SortinoRatio);
        assert_eq!(cfg.optimizer.seed, 42);
        assert_eq!(cfg.walk_forward.n_splits, 4);
        assert_eq!(cfg.walk_forward.train_ratio, 0.7);
        assert_eq!(cfg.oos.test_ratio, 0.3);
        assert!(cfg.validate(&StrategyRegistry::with_builtins()).is_ok());
    }

    #[test]
    fn minimal_document_uses_defaults() {
        let cfg = RunConfig::from_toml_str("[strategy]\nname = \"rsi_reversion\"\n").unwrap();
        assert_eq!(cfg, RunConfig::for_strategy("rsi_reversion"));
    }

    #[test]
    fn validate_rejects_unknown_names() {
        let registry = StrategyRegistry::with_builtins();
        let cfg = RunConfig::for_strategy("martingale");
        assert!(matches!(
            cfg.validate(&registry),
            Err(RunConfigError::Invalid(ConfigError::UnknownStrategy(_)))
        ));

        let mut cfg = RunConfig::for_strategy("ma_crossover");
        cfg.filters.push(FilterConfig::new("moon_phase"));
        assert!(matches!(
            cfg.validate(&registry),
            Err(RunConfigError::Invalid(ConfigError::UnknownFilter(_)))
        ));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        assert!(matches!(
            RunConfig::from_toml_str("[strategy\nname="),
            Err(RunConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let cfg = RunConfig::load(file.path()).unwrap();
        assert_eq!(cfg.optimizer.n_trials, 50);

        let missing = RunConfig::load("/definitely/not/here.toml");
        assert!(matches!(missing, Err(RunConfigError::Io { .. })));
    }

    #[test]
    fn toml_round_trip() {
        let cfg = RunConfig::from_toml_str(SAMPLE).unwrap();
        let text = cfg.to_toml_string().unwrap();
        assert_eq!(RunConfig::from_toml_str(&text).unwrap(), cfg);
    }
}
