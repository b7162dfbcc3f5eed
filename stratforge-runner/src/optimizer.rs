//! Optimizer — seeded random or grid search over a strategy's parameter schema.
//!
//! Random trial `i` draws its candidate from its own RNG stream derived from
//! `(seed, "trial", i)`; grid trial `i` decodes a fixed grid index. Either
//! way the trial history is identical whether trials run sequentially or in
//! parallel on rayon. Ties go to the earliest trial;
//! trials that fail to build or score NaN rank last but stay in the history.
//!
//! Adaptive mode re-runs the search over a trailing window every
//! `retrain_every` bars and records which parameters would have been active
//! on the bars that follow each window.

use std::ops::Range;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use stratforge_core::domain::{validate_series, Bar, ParamSchema, ParameterSet};
use stratforge_core::error::{ConfigError, DataError, EngineError};
use stratforge_core::rng::RngHierarchy;
use thiserror::Error;
use tracing::{debug, info};

use crate::experiment::Experiment;
use crate::fitness::{Direction, FitnessMetric};
use crate::metrics::Metrics;

// ─── Configuration ──────────────────────────────────────────────────

/// How candidates are drawn from the schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampler {
    #[default]
    Random,
    /// Evenly spaced values per parameter. When the full grid exceeds
    /// `n_trials`, trials take an even stride through it.
    Grid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub n_trials: usize,
    pub seed: u64,
    pub metric: FitnessMetric,
    /// Overrides the metric's natural direction.
    pub direction: Option<Direction>,
    /// Names to search; empty searches the whole schema. Others keep their
    /// base/default values.
    pub search_params: Vec<String>,
    pub parallel: bool,
    pub sampler: Sampler,
    /// Values per int/float parameter in grid mode.
    pub grid_points: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            n_trials: 100,
            seed: 42,
            metric: FitnessMetric::SharpeRatio,
            direction: None,
            search_params: Vec::new(),
            parallel: true,
            sampler: Sampler::Random,
            grid_points: 5,
        }
    }
}

impl OptimizerConfig {
    pub fn direction(&self) -> Direction {
        self.direction.unwrap_or_else(|| self.metric.natural_direction())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub retrain_every: usize,
    /// Trailing window length; `None` means three times `retrain_every`.
    pub window_size: Option<usize>,
    pub optimizer: OptimizerConfig,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            retrain_every: 168,
            window_size: None,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl AdaptiveConfig {
    pub fn window_size(&self) -> usize {
        self.window_size.unwrap_or(self.retrain_every * 3)
    }

    /// Training windows `[i, i + window)` stepping by `retrain_every` while
    /// the window ends strictly before the last bar.
    pub fn windows(&self, n_bars: usize) -> Vec<Range<usize>> {
        let window = self.window_size();
        let step = self.retrain_every.max(1);
        let mut out = Vec::new();
        let mut start = 0;
        while start + window < n_bars {
            out.push(start..start + window);
            start += step;
        }
        out
    }
}

// ─── Result types ───────────────────────────────────────────────────

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub index: usize,
    pub params: ParameterSet,
    /// NaN when the trial failed.
    pub score: f64,
    pub metrics: Option<Metrics>,
    pub error: Option<String>,
}

impl Trial {
    pub fn is_valid(&self) -> bool {
        self.metrics.is_some() && !self.score.is_nan()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub strategy: String,
    pub best_params: ParameterSet,
    pub best_score: f64,
    pub best_metrics: Metrics,
    pub trials: Vec<Trial>,
    /// Running best score after each trial; NaN until the first valid trial.
    pub convergence: Vec<f64>,
    pub metric: FitnessMetric,
    pub direction: Direction,
}

impl OptimizationResult {
    /// Trials ordered best first. NaN and failed trials sort last; ties keep
    /// trial order.
    pub fn ranked(&self) -> Vec<&Trial> {
        let mut out: Vec<&Trial> = self.trials.iter().collect();
        let dir = self.direction;
        out.sort_by(|a, b| {
            if dir.is_better(a.score, b.score) {
                std::cmp::Ordering::Less
            } else if dir.is_better(b.score, a.score) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });
        out
    }

    pub fn valid_trials(&self) -> usize {
        self.trials.iter().filter(|t| t.is_valid()).count()
    }
}

/// Parameters chosen on one trailing window, active until the next retrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamEpoch {
    pub train_range: Range<usize>,
    /// Starts at the end of `train_range`.
    pub active_range: Range<usize>,
    pub params: ParameterSet,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveResult {
    pub epochs: Vec<ParamEpoch>,
    pub windows: Vec<OptimizationResult>,
}

impl AdaptiveResult {
    /// Parameters active at bar `index`, if any epoch covers it.
    pub fn params_at(&self, index: usize) -> Option<&ParameterSet> {
        self.epochs
            .iter()
            .rev()
            .find(|e| e.active_range.contains(&index))
            .map(|e| &e.params)
    }
}

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("optimizer needs at least one trial")]
    NoTrials,

    #[error("search parameter '{0}' is not in the strategy schema")]
    UnknownSearchParam(String),

    #[error("all {trials} trials failed; first error: {first_error}")]
    AllTrialsFailed { trials: usize, first_error: String },

    #[error("adaptive mode needs more than {window} bars, got {bars}")]
    InsufficientData { bars: usize, window: usize },

    #[error("invalid configuration")]
    Config(#[source] ConfigError),

    #[error("invalid bar series")]
    Data(#[source] DataError),
}

impl From<EngineError> for OptimizeError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config(e) => OptimizeError::Config(e),
            EngineError::Data(e) => OptimizeError::Data(e),
        }
    }
}

// ─── Search ─────────────────────────────────────────────────────────

/// Random or grid search over `experiment`'s schema on `bars`.
///
/// The series and engine settings are validated once up front; afterwards
/// only individual trials can fail.
pub fn optimize(
    experiment: &Experiment,
    bars: &[Bar],
    config: &OptimizerConfig,
) -> Result<OptimizationResult, OptimizeError> {
    if config.n_trials == 0 {
        return Err(OptimizeError::NoTrials);
    }
    experiment.backtest.validate().map_err(OptimizeError::Config)?;
    validate_series(bars).map_err(OptimizeError::Data)?;
    let schema = search_space(experiment, config)?;

    let direction = config.direction();
    // An empty space has a single candidate: the base parameters.
    let grid_size = schema.grid_size(config.grid_points);
    let n_trials = match (schema.is_empty(), config.sampler) {
        (true, _) => 1,
        (false, Sampler::Random) => config.n_trials,
        (false, Sampler::Grid) => config.n_trials.min(grid_size),
    };
    let rng = RngHierarchy::new(config.seed);

    let run_trial = |index: usize| -> Trial {
        let candidate = match config.sampler {
            Sampler::Random => schema.sample(&mut rng.rng_for("trial", index as u64)),
            Sampler::Grid => {
                let point = (index as u128 * grid_size as u128 / n_trials as u128) as usize;
                schema.grid_point(point, config.grid_points)
            }
        };
        let params = experiment.effective_params(&candidate);
        let trial = match experiment.evaluate(&candidate, bars) {
            Ok((_, metrics)) => Trial {
                index,
                params,
                score: config.metric.extract(&metrics),
                metrics: Some(metrics),
                error: None,
            },
            Err(err) => Trial {
                index,
                params,
                score: f64::NAN,
                metrics: None,
                error: Some(err.to_string()),
            },
        };
        debug!(trial = index, score = trial.score, params = %trial.params, "trial finished");
        trial
    };

    let trials: Vec<Trial> = if config.parallel {
        (0..n_trials).into_par_iter().map(run_trial).collect()
    } else {
        (0..n_trials).map(run_trial).collect()
    };

    let mut best: Option<&Trial> = None;
    let mut convergence = Vec::with_capacity(trials.len());
    for trial in &trials {
        let improves = trial.is_valid()
            && best.map_or(true, |b| direction.is_better(trial.score, b.score));
        if improves {
            best = Some(trial);
        }
        convergence.push(best.map_or(f64::NAN, |b| b.score));
    }

    let Some(best) = best else {
        let first_error = trials
            .iter()
            .find_map(|t| t.error.clone())
            .unwrap_or_else(|| "every score was NaN".to_string());
        return Err(OptimizeError::AllTrialsFailed {
            trials: trials.len(),
            first_error,
        });
    };
    let (best_params, best_score) = (best.params.clone(), best.score);
    let best_metrics = best.metrics.clone().ok_or_else(|| OptimizeError::AllTrialsFailed {
        trials: trials.len(),
        first_error: "best trial has no metrics".to_string(),
    })?;

    info!(
        strategy = experiment.strategy_name(),
        metric = %config.metric,
        trials = trials.len(),
        best_score,
        best_params = %best_params,
        "optimization finished"
    );

    Ok(OptimizationResult {
        strategy: experiment.strategy_name().to_string(),
        best_params,
        best_score,
        best_metrics,
        trials,
        convergence,
        metric: config.metric,
        direction,
    })
}

/// Re-optimize every `retrain_every` bars over a trailing window.
pub fn optimize_adaptive(
    experiment: &Experiment,
    bars: &[Bar],
    config: &AdaptiveConfig,
) -> Result<AdaptiveResult, OptimizeError> {
    let windows = config.windows(bars.len());
    if windows.is_empty() {
        return Err(OptimizeError::InsufficientData {
            bars: bars.len(),
            window: config.window_size(),
        });
    }

    let mut epochs = Vec::with_capacity(windows.len());
    let mut results = Vec::with_capacity(windows.len());
    for train in windows {
        let result = optimize(experiment, &bars[train.clone()], &config.optimizer)?;
        let active_end = (train.end + config.retrain_every.max(1)).min(bars.len());
        info!(
            window_start = train.start,
            window_end = train.end,
            best_score = result.best_score,
            params = %result.best_params,
            "adaptive window optimized"
        );
        epochs.push(ParamEpoch {
            active_range: train.end..active_end,
            train_range: train,
            params: result.best_params.clone(),
            score: result.best_score,
        });
        results.push(result);
    }

    Ok(AdaptiveResult {
        epochs,
        windows: results,
    })
}

fn search_space(experiment: &Experiment, config: &OptimizerConfig) -> Result<ParamSchema, OptimizeError> {
    let schema = experiment.descriptor.param_schema();
    if config.search_params.is_empty() {
        return Ok(schema);
    }
    if let Some(unknown) = config.search_params.iter().find(|n| schema.get(n).is_none()) {
        return Err(OptimizeError::UnknownSearchParam(unknown.clone()));
    }
    Ok(schema.restricted_to(&config.search_params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::trending_bars;
    use stratforge_core::components::StrategyRegistry;

    fn ma_experiment() -> Experiment {
        let registry = StrategyRegistry::with_builtins();
        Experiment::new(*registry.get("ma_crossover").unwrap())
    }

    fn small(n_trials: usize, parallel: bool) -> OptimizerConfig {
        OptimizerConfig {
            n_trials,
            parallel,
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn zero_trials_rejected() {
        let err = optimize(&ma_experiment(), &trending_bars(100), &small(0, false)).unwrap_err();
        assert!(matches!(err, OptimizeError::NoTrials));
    }

    #[test]
    fn unknown_search_param_rejected() {
        let config = OptimizerConfig {
            search_params: vec!["lookback".into()],
            ..small(5, false)
        };
        let err = optimize(&ma_experiment(), &trending_bars(100), &config).unwrap_err();
        assert!(matches!(err, OptimizeError::UnknownSearchParam(_)));
    }

    #[test]
    fn parallel_matches_sequential() {
        let bars = trending_bars(250);
        let a = optimize(&ma_experiment(), &bars, &small(24, true)).unwrap();
        let b = optimize(&ma_experiment(), &bars, &small(24, false)).unwrap();
        assert_eq!(a.trials.len(), 24);
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(
            a.trials.iter().map(|t| t.params.clone()).collect::<Vec<_>>(),
            b.trials.iter().map(|t| t.params.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn convergence_is_monotone_running_best() {
        let result = optimize(&ma_experiment(), &trending_bars(250), &small(30, true)).unwrap();
        let valid: Vec<f64> = result.convergence.iter().copied().filter(|s| !s.is_nan()).collect();
        for w in valid.windows(2) {
            assert!(w[1] >= w[0]);
        }
        assert_eq!(result.convergence.last().copied(), Some(result.best_score));
    }

    #[test]
    fn invalid_candidates_rank_last() {
        // fast_period >= slow_period fails to build for some draws.
        let result = optimize(&ma_experiment(), &trending_bars(250), &small(60, true)).unwrap();
        let ranked = result.ranked();
        let first_invalid = ranked.iter().position(|t| !t.is_valid());
        if let Some(pos) = first_invalid {
            assert!(ranked[pos..].iter().all(|t| !t.is_valid()));
        }
        assert!(ranked[0].is_valid());
        assert_eq!(ranked[0].score, result.best_score);
    }

    #[test]
    fn restricted_search_keeps_other_params() {
        let exp = ma_experiment().with_params(ParameterSet::new().with("slow_period", 40_i64));
        let config = OptimizerConfig {
            search_params: vec!["fast_period".into()],
            ..small(10, false)
        };
        let result = optimize(&exp, &trending_bars(200), &config).unwrap();
        for trial in &result.trials {
            assert_eq!(trial.params.usize("slow_period").unwrap(), 40);
        }
    }

    #[test]
    fn minimize_override() {
        let config = OptimizerConfig {
            metric: FitnessMetric::MaxDrawdownPct,
            ..small(20, false)
        };
        assert_eq!(config.direction(), Direction::Minimize);
        let result = optimize(&ma_experiment(), &trending_bars(200), &config).unwrap();
        let min = result
            .trials
            .iter()
            .filter(|t| t.is_valid())
            .map(|t| t.score)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(result.best_score, min);
    }

    fn grid(n_trials: usize) -> (Experiment, OptimizerConfig) {
        let exp = ma_experiment().with_params(ParameterSet::new().with("slow_period", 40_i64));
        let config = OptimizerConfig {
            sampler: Sampler::Grid,
            grid_points: 4,
            search_params: vec!["fast_period".into(), "ma_type".into()],
            ..small(n_trials, false)
        };
        (exp, config)
    }

    #[test]
    fn grid_search_stops_at_grid_size() {
        let (exp, config) = grid(100);
        let result = optimize(&exp, &trending_bars(200), &config).unwrap();
        // fast_period 2, 35, 67, 100 x ma_type sma, ema
        assert_eq!(result.trials.len(), 8);
        let params: Vec<ParameterSet> = result.trials.iter().map(|t| t.params.clone()).collect();
        for (i, p) in params.iter().enumerate() {
            assert!(params[i + 1..].iter().all(|q| q != p), "duplicate candidate {p}");
        }
        let fast: Vec<usize> = params.iter().map(|p| p.usize("fast_period").unwrap()).collect();
        assert_eq!(fast, vec![2, 2, 35, 35, 67, 67, 100, 100]);
        // fast >= slow cannot build but stays in the history
        for trial in result.trials.iter().filter(|t| t.params.usize("fast_period").unwrap() >= 40) {
            assert!(trial.error.is_some());
        }
    }

    #[test]
    fn grid_search_strides_when_capped() {
        let (exp, config) = grid(3);
        let result = optimize(&exp, &trending_bars(200), &config).unwrap();
        let picked: Vec<(usize, String)> = result
            .trials
            .iter()
            .map(|t| {
                (
                    t.params.usize("fast_period").unwrap(),
                    t.params.text("ma_type").unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            picked,
            vec![(2, "sma".to_string()), (35, "sma".to_string()), (67, "ema".to_string())]
        );
    }

    #[test]
    fn grid_search_ignores_seed_and_parallelism() {
        let (exp, config) = grid(100);
        let bars = trending_bars(200);
        let a = optimize(&exp, &bars, &config).unwrap();
        let other = OptimizerConfig {
            seed: 9,
            parallel: true,
            ..config
        };
        let b = optimize(&exp, &bars, &other).unwrap();
        assert_eq!(a.trials, b.trials);
        assert_eq!(a.best_params, b.best_params);
    }

    #[test]
    fn sampler_reads_from_toml() {
        let config: OptimizerConfig = toml::from_str("sampler = \"grid\"\ngrid_points = 3").unwrap();
        assert_eq!(config.sampler, Sampler::Grid);
        assert_eq!(config.grid_points, 3);
        assert_eq!(OptimizerConfig::default().sampler, Sampler::Random);
    }

    #[test]
    fn adaptive_windows_step_and_stop() {
        let config = AdaptiveConfig {
            retrain_every: 10,
            window_size: Some(30),
            ..AdaptiveConfig::default()
        };
        let w = config.windows(65);
        assert_eq!(w, vec![0..30, 10..40, 20..50, 30..60]);
        assert!(config.windows(30).is_empty());
        assert_eq!(AdaptiveConfig::default().window_size(), 504);
    }

    #[test]
    fn adaptive_epochs_are_time_ordered() {
        let config = AdaptiveConfig {
            retrain_every: 40,
            window_size: Some(120),
            optimizer: small(8, true),
        };
        let bars = trending_bars(260);
        let result = optimize_adaptive(&ma_experiment(), &bars, &config).unwrap();
        assert_eq!(result.epochs.len(), 4);
        for e in &result.epochs {
            assert_eq!(e.active_range.start, e.train_range.end);
            assert!(e.active_range.end <= bars.len());
        }
        assert_eq!(result.params_at(125), Some(&result.epochs[0].params));
        assert_eq!(result.params_at(10), None);
    }

    #[test]
    fn adaptive_needs_enough_bars() {
        let err = optimize_adaptive(&ma_experiment(), &trending_bars(100), &AdaptiveConfig::default())
            .unwrap_err();
        assert!(matches!(err, OptimizeError::InsufficientData { .. }));
    }
}
