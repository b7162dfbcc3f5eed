//! Property tests for validation invariants.
//!
//! 1. Walk-forward windows: train precedes test, test ranges are ordered and
//!    disjoint, and train ∪ test over all windows is every bar exactly once
//! 2. Metrics are a pure function of the run result
//! 3. The OOS split point always leaves both halves non-empty and in order

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use stratforge_core::components::StrategyRegistry;
use stratforge_core::domain::{Bar, ParameterSet};
use stratforge_core::engine::{run_backtest, BacktestConfig};
use stratforge_runner::{create_windows, Metrics, OosConfig};

fn bars_from_returns(returns: &[f64]) -> Vec<Bar> {
    let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    let mut close: f64 = 100.0;
    returns
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let open = close;
            close = (close * (1.0 + r)).max(0.01);
            Bar::new(
                t0 + Duration::hours(i as i64),
                open,
                open.max(close) * 1.003,
                open.min(close) * 0.997,
                close,
                250.0,
            )
        })
        .collect()
}

proptest! {
    #[test]
    fn walk_forward_windows_partition_the_series(
        total in 2usize..5_000,
        n_splits in 1usize..20,
        train_ratio in 0.05..0.95_f64,
    ) {
        prop_assume!(total / n_splits >= 2);
        let windows = create_windows(total, n_splits, train_ratio).unwrap();
        prop_assert_eq!(windows.len(), n_splits);

        let mut next = 0usize;
        for (i, w) in windows.iter().enumerate() {
            prop_assert_eq!(w.index, i);
            prop_assert_eq!(w.train_range.start, next);
            prop_assert!(w.train_range.start < w.train_range.end);
            prop_assert_eq!(w.train_range.end, w.test_range.start);
            prop_assert!(w.test_range.start < w.test_range.end);
            next = w.test_range.end;
        }
        prop_assert_eq!(next, total);
    }

    #[test]
    fn metrics_are_pure(
        returns in prop::collection::vec(-0.08..0.08_f64, 40..200),
    ) {
        let bars = bars_from_returns(&returns);
        let registry = StrategyRegistry::with_builtins();
        let strategy = registry.create("rsi_reversion", &ParameterSet::new()).unwrap();
        let run = run_backtest(strategy.as_ref(), &bars, &BacktestConfig::default()).unwrap();

        let a = Metrics::compute(&run, None);
        let b = Metrics::compute(&run.clone(), None);
        prop_assert_eq!(&a, &b);
        prop_assert!(a.max_drawdown_pct >= 0.0);
        prop_assert!((0.0..=100.0).contains(&a.win_rate));
        prop_assert!(a.profit_factor >= 0.0 && a.profit_factor <= 100.0);
        prop_assert_eq!(a.total_trades, a.winning_trades + a.losing_trades);
    }

    #[test]
    fn oos_split_keeps_both_halves(total in 2usize..10_000, ratio in -1.0..2.0_f64) {
        let config = OosConfig { test_ratio: ratio, optimizer: None };
        let split = config.split_index(total);
        let r = config.effective_test_ratio();
        prop_assert!((0.1..=0.5).contains(&r));
        prop_assert!(split >= total / 2);
        prop_assert!(split < total);
    }
}
