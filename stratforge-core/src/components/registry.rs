//! Strategy registry — name → constructor references, no reflection.
//!
//! A `StrategyDescriptor` is the "strategy class" the optimizer and the
//! walk-forward engine instantiate once per trial. Registration is explicit:
//! built-ins via `with_builtins()`, user strategies via `register()`.

use std::collections::BTreeMap;

use crate::domain::{ParamSchema, ParameterSet};
use crate::error::ConfigError;

use super::strategy::{
    BollingerReversion, DonchianBreakout, MaCrossover, MacdCrossover, RsiReversion, Strategy,
    SupertrendFlip, TripleEma, VolatilityBreakout,
};

/// Constructor for a strategy from fully merged parameters.
pub type BuildFn = fn(&ParameterSet) -> Result<Box<dyn Strategy>, ConfigError>;

/// Everything needed to build and search one strategy type.
#[derive(Clone, Copy)]
pub struct StrategyDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub default_params: fn() -> ParameterSet,
    pub param_schema: fn() -> ParamSchema,
    pub build: BuildFn,
}

impl StrategyDescriptor {
    pub fn default_params(&self) -> ParameterSet {
        (self.default_params)()
    }

    pub fn param_schema(&self) -> ParamSchema {
        (self.param_schema)()
    }

    /// Validate `params` against the schema, overlay them on the defaults and build.
    pub fn instantiate(&self, params: &ParameterSet) -> Result<Box<dyn Strategy>, ConfigError> {
        self.param_schema().validate(params)?;
        let merged = self.default_params().merged(params);
        (self.build)(&merged)
    }
}

impl std::fmt::Debug for StrategyDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StrategyRegistry {
    entries: BTreeMap<&'static str, StrategyDescriptor>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in trend, breakout and mean-reversion strategy.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in [
            MaCrossover::descriptor(),
            MacdCrossover::descriptor(),
            TripleEma::descriptor(),
            SupertrendFlip::descriptor(),
            DonchianBreakout::descriptor(),
            VolatilityBreakout::descriptor(),
            RsiReversion::descriptor(),
            BollingerReversion::descriptor(),
        ] {
            registry.register(descriptor);
        }
        registry
    }

    /// Add or replace a registration.
    pub fn register(&mut self, descriptor: StrategyDescriptor) {
        self.entries.insert(descriptor.name, descriptor);
    }

    pub fn get(&self, name: &str) -> Result<&StrategyDescriptor, ConfigError> {
        self.entries
            .get(name)
            .ok_or_else(|| ConfigError::UnknownStrategy(name.to_string()))
    }

    pub fn create(&self, name: &str, params: &ParameterSet) -> Result<Box<dyn Strategy>, ConfigError> {
        self.get(name)?.instantiate(params)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &StrategyDescriptor> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_registered() {
        let r = StrategyRegistry::with_builtins();
        assert_eq!(
            r.names(),
            vec![
                "bollinger_reversion",
                "donchian_breakout",
                "ma_crossover",
                "macd_crossover",
                "rsi_reversion",
                "supertrend",
                "triple_ema",
                "volatility_breakout",
            ]
        );
    }

    #[test]
    fn builtin_defaults_satisfy_their_schemas() {
        let r = StrategyRegistry::with_builtins();
        for d in r.descriptors() {
            let defaults = d.default_params();
            d.param_schema().validate(&defaults).unwrap();
            let s = d.instantiate(&ParameterSet::new()).unwrap();
            assert_eq!(s.name(), d.name);
            assert!(s.required_history() > 1, "{}", d.name);
        }
    }

    #[test]
    fn create_merges_over_defaults() {
        let r = StrategyRegistry::with_builtins();
        let s = r
            .create("ma_crossover", &ParameterSet::new().with("fast_period", 5i64))
            .unwrap();
        assert_eq!(s.params().usize("fast_period").unwrap(), 5);
        assert_eq!(s.params().usize("slow_period").unwrap(), 21);
    }

    #[test]
    fn unknown_strategy_is_config_fault() {
        let r = StrategyRegistry::with_builtins();
        assert!(matches!(
            r.create("nope", &ParameterSet::new()),
            Err(ConfigError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn schema_violation_rejected() {
        let r = StrategyRegistry::with_builtins();
        let bad = ParameterSet::new().with("fast_period", 500i64);
        assert!(matches!(
            r.create("ma_crossover", &bad),
            Err(ConfigError::InvalidParam { .. })
        ));
        let unknown = ParameterSet::new().with("bogus", 1i64);
        assert!(matches!(
            r.create("ma_crossover", &unknown),
            Err(ConfigError::UnknownParam(_))
        ));
    }
}
