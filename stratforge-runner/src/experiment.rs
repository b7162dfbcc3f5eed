//! Experiment — everything one trial needs except the candidate parameters
//! and the bar slice.
//!
//! Each call to [`Experiment::run`] builds its own strategy and filter chain,
//! so trials running on different rayon workers share no mutable state.

use stratforge_core::components::{FilterChain, FilterConfig, FilterContext, StrategyDescriptor};
use stratforge_core::domain::{Bar, ParameterSet, RunResult};
use stratforge_core::engine::{run_filtered, BacktestConfig};
use stratforge_core::error::EngineError;

use crate::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct Experiment {
    pub descriptor: StrategyDescriptor,
    /// Fixed overrides applied under every candidate.
    pub base_params: ParameterSet,
    pub filters: Vec<FilterConfig>,
    pub context: FilterContext,
    pub backtest: BacktestConfig,
}

impl Experiment {
    pub fn new(descriptor: StrategyDescriptor) -> Self {
        Self {
            descriptor,
            base_params: ParameterSet::new(),
            filters: Vec::new(),
            context: FilterContext::new(),
            backtest: BacktestConfig::default(),
        }
    }

    pub fn with_params(mut self, params: ParameterSet) -> Self {
        self.base_params = params;
        self
    }

    pub fn with_filters(mut self, filters: Vec<FilterConfig>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_context(mut self, context: FilterContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_backtest(mut self, backtest: BacktestConfig) -> Self {
        self.backtest = backtest;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Candidate parameters overlaid on the fixed overrides.
    pub fn effective_params(&self, candidate: &ParameterSet) -> ParameterSet {
        self.base_params.merged(candidate)
    }

    /// Build a fresh strategy and filter chain and backtest them over `bars`.
    pub fn run(&self, candidate: &ParameterSet, bars: &[Bar]) -> Result<RunResult, EngineError> {
        let strategy = self.descriptor.instantiate(&self.effective_params(candidate))?;
        let chain = FilterChain::from_configs(&self.filters)?;
        run_filtered(strategy.as_ref(), &chain, &self.context, bars, &self.backtest)
    }

    /// Run and score in one step.
    pub fn evaluate(
        &self,
        candidate: &ParameterSet,
        bars: &[Bar],
    ) -> Result<(RunResult, Metrics), EngineError> {
        let result = self.run(candidate, bars)?;
        let metrics = Metrics::compute(&result, self.backtest.periods_per_year);
        Ok((result, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::trending_bars;
    use stratforge_core::components::StrategyRegistry;
    use stratforge_core::error::ConfigError;

    #[test]
    fn candidate_overrides_base_params() {
        let registry = StrategyRegistry::with_builtins();
        let exp = Experiment::new(*registry.get("ma_crossover").unwrap())
            .with_params(ParameterSet::new().with("fast_period", 5_i64));
        let eff = exp.effective_params(&ParameterSet::new().with("fast_period", 8_i64));
        assert_eq!(eff.usize("fast_period").unwrap(), 8);
    }

    #[test]
    fn run_rejects_unknown_filter() {
        let registry = StrategyRegistry::with_builtins();
        let exp = Experiment::new(*registry.get("ma_crossover").unwrap())
            .with_filters(vec![FilterConfig::new("astrology")]);
        let err = exp.run(&ParameterSet::new(), &trending_bars(80)).unwrap_err();
        assert!(matches!(err, EngineError::Config(ConfigError::UnknownFilter(_))));
    }

    #[test]
    fn evaluate_is_repeatable() {
        let registry = StrategyRegistry::with_builtins();
        let exp = Experiment::new(*registry.get("rsi_reversion").unwrap());
        let bars = trending_bars(200);
        let (r1, m1) = exp.evaluate(&ParameterSet::new(), &bars).unwrap();
        let (r2, m2) = exp.evaluate(&ParameterSet::new(), &bars).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(m1, m2);
    }
}
