//! StratForge CLI — backtest, optimize and validate strategies over a CSV bar file.
//!
//! Commands:
//! - `backtest` — one run with the configured parameters
//! - `optimize` — random search (or `--adaptive` rolling re-optimization)
//! - `walk-forward` — rolling train/test validation
//! - `oos` — single chronological in-sample/out-of-sample split
//! - `paper-compare` — replay the series through the paper engine and the backtest
//! - `strategies` — list registered strategies and their parameters

mod bars;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use stratforge_core::components::StrategyRegistry;
use stratforge_core::domain::{Bar, ParamKind};
use stratforge_live::{compare_with_backtest, ParityReport};
use stratforge_runner::{
    optimize, optimize_adaptive, run_oos, run_walk_forward, AdaptiveResult, FitnessMetric, Metrics,
    OosResult, OptimizationResult, RunConfig, Sampler, WalkForwardResult,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stratforge",
    about = "StratForge CLI — strategy backtesting, optimization and validation"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG overrides).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// CSV file with timestamp,open,high,low,close,volume.
    #[arg(long)]
    data: PathBuf,

    /// TOML run configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Strategy name; overrides the one in --config.
    #[arg(long)]
    strategy: Option<String>,

    /// Print the full result as JSON instead of a summary.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backtest.
    Backtest {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Search the parameter space.
    Optimize {
        #[command(flatten)]
        run: RunArgs,

        /// Number of trials (overrides the config).
        #[arg(long)]
        trials: Option<usize>,

        /// Fitness metric, e.g. sharpe_ratio, total_return_pct.
        #[arg(long)]
        metric: Option<String>,

        /// RNG seed (overrides the config).
        #[arg(long)]
        seed: Option<u64>,

        /// Walk an evenly spaced grid instead of random draws.
        #[arg(long, default_value_t = false)]
        grid: bool,

        /// Re-optimize on a rolling window instead of once.
        #[arg(long, default_value_t = false)]
        adaptive: bool,
    },
    /// Walk-forward validation.
    WalkForward {
        #[command(flatten)]
        run: RunArgs,

        /// Number of windows (overrides the config).
        #[arg(long)]
        splits: Option<usize>,
    },
    /// Out-of-sample test on one chronological split.
    Oos {
        #[command(flatten)]
        run: RunArgs,

        /// Fraction of bars held out, clamped to [0.1, 0.5].
        #[arg(long)]
        test_ratio: Option<f64>,

        /// Optimize on the in-sample half first.
        #[arg(long, default_value_t = false)]
        optimize: bool,
    },
    /// Check that the paper engine reproduces the backtest.
    PaperCompare {
        #[command(flatten)]
        run: RunArgs,

        /// Allowed return difference in percentage points.
        #[arg(long, default_value_t = stratforge_live::DEFAULT_TOLERANCE_PCT)]
        tolerance: f64,
    },
    /// List registered strategies.
    Strategies,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let registry = StrategyRegistry::with_builtins();

    match cli.command {
        Commands::Backtest { run } => run_backtest_cmd(&registry, &run),
        Commands::Optimize {
            run,
            trials,
            metric,
            seed,
            grid,
            adaptive,
        } => run_optimize_cmd(&registry, &run, trials, metric.as_deref(), seed, grid, adaptive),
        Commands::WalkForward { run, splits } => run_walk_forward_cmd(&registry, &run, splits),
        Commands::Oos {
            run,
            test_ratio,
            optimize,
        } => run_oos_cmd(&registry, &run, test_ratio, optimize),
        Commands::PaperCompare { run, tolerance } => run_paper_compare_cmd(&registry, &run, tolerance),
        Commands::Strategies => {
            list_strategies(&registry);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the run configuration and the bar series named by `args`.
fn load_inputs(args: &RunArgs) -> Result<(RunConfig, Vec<Bar>)> {
    let mut config = match (&args.config, &args.strategy) {
        (Some(path), _) => RunConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, Some(name)) => RunConfig::for_strategy(name.clone()),
        (None, None) => bail!("one of --config or --strategy is required"),
    };
    if let Some(name) = &args.strategy {
        config.strategy.name = name.clone();
    }
    let bars = bars::load_bars(&args.data)?;
    info!(
        path = %args.data.display(),
        bars = bars.len(),
        strategy = %config.strategy.name,
        "inputs loaded"
    );
    Ok((config, bars))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_backtest_cmd(registry: &StrategyRegistry, args: &RunArgs) -> Result<()> {
    let (config, bars) = load_inputs(args)?;
    let experiment = config.experiment(registry, &bars)?;
    let (result, metrics) = experiment
        .evaluate(&config.strategy.params, &bars)
        .context("backtest failed")?;
    if args.json {
        #[derive(Serialize)]
        struct Output<'a> {
            result: &'a stratforge_core::RunResult,
            metrics: &'a Metrics,
        }
        return emit(&Output {
            result: &result,
            metrics: &metrics,
        });
    }
    println!();
    println!("=== Backtest Result ===");
    println!("Strategy:       {}", result.strategy);
    println!("Params:         {}", result.params);
    println!("Bars:           {}", bars.len());
    println!("Faults:         {} ({:?})", result.faults.total, result.faults.health);
    print_metrics(&metrics);
    Ok(())
}

fn run_optimize_cmd(
    registry: &StrategyRegistry,
    args: &RunArgs,
    trials: Option<usize>,
    metric: Option<&str>,
    seed: Option<u64>,
    grid: bool,
    adaptive: bool,
) -> Result<()> {
    let (mut config, bars) = load_inputs(args)?;
    if let Some(n) = trials {
        config.optimizer.n_trials = n;
    }
    if let Some(seed) = seed {
        config.optimizer.seed = seed;
    }
    if grid {
        config.optimizer.sampler = Sampler::Grid;
    }
    if let Some(name) = metric {
        let Some(metric) = FitnessMetric::from_name(name) else {
            let valid: Vec<&str> = FitnessMetric::ALL.iter().map(|m| m.name()).collect();
            bail!("unknown metric '{name}'. Valid: {}", valid.join(", "));
        };
        config.optimizer.metric = metric;
    }
    let experiment = config.experiment(registry, &bars)?;

    if adaptive {
        config.adaptive.optimizer = config.optimizer.clone();
        let result = optimize_adaptive(&experiment, &bars, &config.adaptive)
            .context("adaptive optimization failed")?;
        return if args.json {
            emit(&result)
        } else {
            print_adaptive(&result);
            Ok(())
        };
    }

    let result = optimize(&experiment, &bars, &config.optimizer).context("optimization failed")?;
    if args.json {
        return emit(&result);
    }
    print_optimization(&result);
    Ok(())
}

fn run_walk_forward_cmd(registry: &StrategyRegistry, args: &RunArgs, splits: Option<usize>) -> Result<()> {
    let (mut config, bars) = load_inputs(args)?;
    if let Some(n) = splits {
        config.walk_forward.n_splits = n;
    }
    let experiment = config.experiment(registry, &bars)?;
    let result = run_walk_forward(&experiment, &bars, &config.walk_forward)
        .context("walk-forward validation failed")?;
    if args.json {
        return emit(&result);
    }
    print_walk_forward(&result);
    Ok(())
}

fn run_oos_cmd(
    registry: &StrategyRegistry,
    args: &RunArgs,
    test_ratio: Option<f64>,
    optimize_first: bool,
) -> Result<()> {
    let (mut config, bars) = load_inputs(args)?;
    if let Some(ratio) = test_ratio {
        config.oos.test_ratio = ratio;
    }
    if optimize_first && config.oos.optimizer.is_none() {
        config.oos.optimizer = Some(config.optimizer.clone());
    }
    let experiment = config.experiment(registry, &bars)?;
    let result = run_oos(&experiment, &config.strategy.params, &bars, &config.oos)
        .context("out-of-sample test failed")?;
    if args.json {
        return emit(&result);
    }
    print_oos(&result);
    Ok(())
}

fn run_paper_compare_cmd(registry: &StrategyRegistry, args: &RunArgs, tolerance: f64) -> Result<()> {
    let (config, bars) = load_inputs(args)?;
    config.validate(registry)?;
    let descriptor = registry.get(&config.strategy.name)?;
    let context = config.context.build(&bars);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let report = runtime
        .block_on(compare_with_backtest(
            descriptor,
            &config.strategy.params,
            &config.filters,
            &context,
            &bars,
            &config.backtest,
            tolerance,
        ))
        .context("paper comparison failed")?;
    if args.json {
        emit(&report)?;
    } else {
        print_parity(&report);
    }
    if !report.matches {
        bail!("paper engine diverges from the backtest");
    }
    Ok(())
}

fn list_strategies(registry: &StrategyRegistry) {
    for descriptor in registry.descriptors() {
        println!("{:<20} {}", descriptor.name, descriptor.description);
        for (name, spec) in descriptor.param_schema().iter() {
            let range = match &spec.kind {
                ParamKind::Int => format!("int [{}, {}]", spec.min, spec.max),
                ParamKind::Float => format!("float [{}, {}]", spec.min, spec.max),
                ParamKind::Choice(options) => format!("one of {}", options.join("|")),
            };
            println!("    {name:<18} {range:<22} {}", spec.description);
        }
    }
}

// ─── Printing ────────────────────────────────────────────────────────

fn print_metrics(m: &Metrics) {
    println!("Trades:         {}", m.total_trades);
    println!();
    println!("--- Performance ---");
    println!("Total Return:   {:.2}%", m.total_return_pct);
    println!("Annualized:     {:.2}%", m.annualized_return_pct);
    println!("Sharpe:         {:.3}", m.sharpe_ratio);
    println!("Sortino:        {:.3}", m.sortino_ratio);
    println!("Max Drawdown:   {:.2}% ({} bars)", m.max_drawdown_pct, m.max_drawdown_duration);
    println!("Win Rate:       {:.1}%", m.win_rate);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Avg Trade PnL:  {:.2}", m.avg_trade_pnl);
    println!("Exposure:       {:.1}%", m.exposure_pct);
    println!("Fees:           {:.2}", m.total_fees);
    println!("Final Capital:  {:.2}", m.final_capital);
    println!();
}

fn print_optimization(r: &OptimizationResult) {
    println!();
    println!("=== Optimization Result ===");
    println!("Strategy:       {}", r.strategy);
    println!("Metric:         {} ({:?})", r.metric, r.direction);
    println!("Trials:         {} ({} valid)", r.trials.len(), r.valid_trials());
    println!("Best Score:     {:.4}", r.best_score);
    println!("Best Params:    {}", r.best_params);
    println!();
    println!("{:<6} {:>12}  Params", "Trial", "Score");
    println!("{}", "-".repeat(50));
    for trial in r.ranked().into_iter().take(10) {
        println!("{:<6} {:>12.4}  {}", trial.index, trial.score, trial.params);
    }
    println!();
    print_metrics(&r.best_metrics);
}

fn print_adaptive(r: &AdaptiveResult) {
    println!();
    println!("=== Adaptive Optimization ===");
    println!("{:<14} {:<14} {:>10}  Params", "Train", "Active", "Score");
    println!("{}", "-".repeat(60));
    for epoch in &r.epochs {
        println!(
            "{:<14} {:<14} {:>10.4}  {}",
            format!("{}..{}", epoch.train_range.start, epoch.train_range.end),
            format!("{}..{}", epoch.active_range.start, epoch.active_range.end),
            epoch.score,
            epoch.params
        );
    }
    println!();
}

fn print_walk_forward(r: &WalkForwardResult) {
    println!();
    println!("=== Walk-Forward Result ===");
    println!("Strategy:       {}", r.strategy);
    println!(
        "{:<4} {:<12} {:<12} {:>10} {:>10} {:>8}",
        "Win", "Train", "Test", "IS Ret%", "OOS Ret%", "Trades"
    );
    println!("{}", "-".repeat(62));
    for w in &r.windows {
        println!(
            "{:<4} {:<12} {:<12} {:>10.2} {:>10.2} {:>8}",
            w.window.index,
            format!("{}..{}", w.window.train_range.start, w.window.train_range.end),
            format!("{}..{}", w.window.test_range.start, w.window.test_range.end),
            w.in_sample.total_return_pct,
            w.out_of_sample.total_return_pct,
            w.out_of_sample.total_trades
        );
    }
    let s = &r.summary;
    println!();
    println!("Mean OOS Return:   {:.2}% (std {:.2})", s.mean_oos_return_pct, s.std_oos_return_pct);
    println!("Compounded OOS:    {:.2}%", s.compounded_oos_return_pct);
    println!("Mean OOS Sharpe:   {:.3}", s.mean_oos_sharpe);
    println!("Mean OOS Drawdown: {:.2}%", s.mean_oos_max_drawdown_pct);
    println!("Efficiency Ratio:  {:.3} ({:?})", s.efficiency_ratio, s.efficiency_flag);
    println!();
}

fn print_oos(r: &OosResult) {
    println!();
    println!("=== Out-of-Sample Result ===");
    println!("Strategy:       {}", r.strategy);
    println!("Params:         {}", r.params);
    println!("Split:          bar {}", r.split_index);
    println!();
    println!("{:<18} {:>12} {:>12} {:>12}", "Metric", "In-Sample", "OOS", "Degradation");
    println!("{}", "-".repeat(58));
    for row in &r.comparison {
        let degradation = row
            .degradation_pct
            .map_or_else(|| "-".to_string(), |d| format!("{d:.1}%"));
        println!(
            "{:<18} {:>12.3} {:>12.3} {:>12}",
            row.metric, row.in_sample, row.out_of_sample, degradation
        );
    }
    println!();
    println!("Overfitting:    {:.2} ({:?})", r.overfitting_score, r.verdict);
    println!();
}

fn print_parity(r: &ParityReport) {
    println!();
    println!("=== Paper vs Backtest ===");
    println!("Trades:         {} / {}", r.backtest_trades, r.paper_trades);
    println!("Return:         {:.4}% / {:.4}%", r.backtest_return_pct, r.paper_return_pct);
    println!("Return Diff:    {:.4} pp", r.return_diff_pct);
    println!("Capital Diff:   {:.4}%", r.capital_diff_pct);
    println!(
        "Verdict:        {}",
        if r.matches { "MATCH" } else { "MISMATCH" }
    );
    println!();
}
