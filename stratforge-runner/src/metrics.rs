//! Performance metrics — pure functions that compute run statistics.
//!
//! `compute_metrics` maps a `RunResult` to `Metrics` and nothing else: the
//! same run always yields the same numbers. Conventions for degenerate
//! inputs:
//! - no trades → win_rate 0, profit_factor 0
//! - winners but no losers → profit_factor capped at `PROFIT_FACTOR_CAP`
//! - losers but no winners → profit_factor 0
//! - zero-variance returns → sharpe 0; no downside returns → sortino 0
//!
//! Percentages (`*_pct`, `win_rate`) are on a 0–100 scale. Drawdown is
//! reported as a positive magnitude.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratforge_core::domain::{RunResult, Trade};

/// Ceiling for profit factor when there are no losing trades.
pub const PROFIT_FACTOR_CAP: f64 = 100.0;

/// Fallback annualization for series whose spacing cannot be inferred.
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_YEAR: f64 = 365.25;

/// Aggregate performance metrics for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown_pct: f64,
    /// Longest run of bars spent below a prior equity peak.
    pub max_drawdown_duration: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_trade_pnl: f64,
    pub avg_bars_held: f64,
    pub total_fees: f64,
    /// Share of bars with an open position.
    pub exposure_pct: f64,
    pub periods_per_year: f64,
    pub final_capital: f64,
}

impl Metrics {
    /// Compute all metrics for `result`.
    ///
    /// `periods_per_year` annualizes Sharpe and Sortino; `None` infers it from
    /// the equity curve's timestamps.
    pub fn compute(result: &RunResult, periods_per_year: Option<f64>) -> Self {
        let equity = result.equity_values();
        let timestamps = result.timestamps();
        let ppy = periods_per_year
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or_else(|| infer_periods_per_year(&timestamps));
        let trades = &result.trades;
        let (max_dd, dd_duration) = max_drawdown(&equity);

        let winners: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
        let losers: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p <= 0.0).collect();

        Self {
            total_return_pct: total_return_pct(result.initial_capital, result.final_capital),
            annualized_return_pct: annualized_return_pct(
                result.initial_capital,
                result.final_capital,
                &timestamps,
            ),
            sharpe_ratio: sharpe_ratio(&equity, ppy),
            sortino_ratio: sortino_ratio(&equity, ppy),
            max_drawdown_pct: max_dd,
            max_drawdown_duration: dd_duration,
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            total_trades: trades.len(),
            winning_trades: winners.len(),
            losing_trades: losers.len(),
            avg_win: mean_f64(&winners),
            avg_loss: mean_f64(&losers),
            largest_win: winners.iter().copied().fold(0.0, f64::max),
            largest_loss: losers.iter().copied().fold(0.0, f64::min),
            avg_trade_pnl: mean_f64(&trades.iter().map(|t| t.pnl).collect::<Vec<_>>()),
            avg_bars_held: mean_f64(&trades.iter().map(|t| t.bars_held() as f64).collect::<Vec<_>>()),
            total_fees: result.total_fees,
            exposure_pct: exposure_pct(trades, equity.len()),
            periods_per_year: ppy,
            final_capital: result.final_capital,
        }
    }
}

/// Convenience wrapper over [`Metrics::compute`].
pub fn compute_metrics(result: &RunResult, periods_per_year: Option<f64>) -> Metrics {
    Metrics::compute(result, periods_per_year)
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return in percent: (final - initial) / initial × 100.
pub fn total_return_pct(initial_capital: f64, final_capital: f64) -> f64 {
    if initial_capital <= 0.0 {
        return 0.0;
    }
    (final_capital - initial_capital) / initial_capital * 100.0
}

/// Compound annual growth in percent over the calendar span of `timestamps`.
///
/// Returns 0.0 for spans shorter than a day or a non-positive final capital.
pub fn annualized_return_pct(
    initial_capital: f64,
    final_capital: f64,
    timestamps: &[DateTime<Utc>],
) -> f64 {
    let (Some(first), Some(last)) = (timestamps.first(), timestamps.last()) else {
        return 0.0;
    };
    let days = (*last - *first).num_seconds() as f64 / SECONDS_PER_DAY;
    if days < 1.0 || initial_capital <= 0.0 || final_capital <= 0.0 {
        return 0.0;
    }
    let years = days / DAYS_PER_YEAR;
    ((final_capital / initial_capital).powf(1.0 / years) - 1.0) * 100.0
}

/// Annualized Sharpe ratio of periodic equity returns, risk-free rate 0.
///
/// Returns 0.0 if variance is zero or fewer than 2 returns.
pub fn sharpe_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let std = std_dev(&returns);
    if std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / std * periods_per_year.sqrt()
}

/// Annualized Sortino ratio: mean return over the sample deviation of the
/// negative returns.
///
/// Returns 0.0 with fewer than two negative returns or zero downside spread.
pub fn sortino_ratio(equity_curve: &[f64], periods_per_year: f64) -> f64 {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.len() < 2 {
        return 0.0;
    }
    let downside_std = std_dev(&downside);
    if downside_std < 1e-15 {
        return 0.0;
    }
    mean_f64(&returns) / downside_std * periods_per_year.sqrt()
}

/// Maximum peak-to-trough decline in percent (positive) and the longest
/// stretch of consecutive bars below a running peak.
pub fn max_drawdown(equity_curve: &[f64]) -> (f64, usize) {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    let mut current = 0usize;
    let mut longest = 0usize;
    for &eq in equity_curve {
        if eq >= peak {
            peak = eq;
            current = 0;
            continue;
        }
        current += 1;
        longest = longest.max(current);
        if peak > 0.0 {
            worst = worst.max((peak - eq) / peak * 100.0);
        }
    }
    (worst, longest)
}

/// Percentage of trades with positive pnl. 0.0 with no trades.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64 * 100.0
}

/// Gross profit / gross loss.
///
/// 0.0 with no trades or no winners; `PROFIT_FACTOR_CAP` with winners and no
/// losers.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: f64 = trades.iter().map(|t| t.pnl).filter(|p| *p > 0.0).sum();
    let gross_loss: f64 = trades
        .iter()
        .map(|t| t.pnl)
        .filter(|p| *p < 0.0)
        .map(f64::abs)
        .sum();
    if gross_profit <= 0.0 {
        return 0.0;
    }
    if gross_loss < 1e-15 {
        return PROFIT_FACTOR_CAP;
    }
    (gross_profit / gross_loss).min(PROFIT_FACTOR_CAP)
}

/// Percentage of `bar_count` bars spent in a position.
pub fn exposure_pct(trades: &[Trade], bar_count: usize) -> f64 {
    if bar_count == 0 {
        return 0.0;
    }
    let held: usize = trades.iter().map(|t| t.bars_held()).sum();
    (held as f64 / bar_count as f64 * 100.0).min(100.0)
}

/// Annualization factor from the median spacing between timestamps.
///
/// Intraday bars assume a round-the-clock market (365 days), daily bars a
/// 252-session year, weekly 52, monthly 12. Fewer than two timestamps fall
/// back to `DEFAULT_PERIODS_PER_YEAR`.
pub fn infer_periods_per_year(timestamps: &[DateTime<Utc>]) -> f64 {
    let mut gaps: Vec<i64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds())
        .filter(|s| *s > 0)
        .collect();
    if gaps.is_empty() {
        return DEFAULT_PERIODS_PER_YEAR;
    }
    gaps.sort_unstable();
    let median = gaps[gaps.len() / 2] as f64;
    let days = median / SECONDS_PER_DAY;
    if days < 0.99 {
        365.0 * SECONDS_PER_DAY / median
    } else if days < 6.0 {
        252.0
    } else if days < 27.0 {
        52.0
    } else {
        12.0
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Simple returns between consecutive equity points.
pub fn period_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1).
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{make_result, make_trade};
    use chrono::{Duration, TimeZone};

    fn daily(n: usize) -> Vec<DateTime<Utc>> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| t0 + Duration::days(i as i64)).collect()
    }

    #[test]
    fn total_return_basic() {
        assert!((total_return_pct(10_000.0, 11_000.0) - 10.0).abs() < 1e-10);
        assert!((total_return_pct(10_000.0, 9_000.0) + 10.0).abs() < 1e-10);
        assert_eq!(total_return_pct(0.0, 100.0), 0.0);
    }

    #[test]
    fn annualized_return_one_year() {
        let t0 = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let span = vec![t0, t0 + Duration::seconds((DAYS_PER_YEAR * SECONDS_PER_DAY) as i64)];
        let a = annualized_return_pct(100.0, 121.0, &span);
        assert!((a - 21.0).abs() < 1e-6, "got {a}");
        assert_eq!(annualized_return_pct(100.0, 121.0, &span[..1]), 0.0);
    }

    #[test]
    fn sharpe_zero_for_constant_equity() {
        assert_eq!(sharpe_ratio(&[100.0; 50], 252.0), 0.0);
    }

    #[test]
    fn sharpe_positive_for_noisy_uptrend() {
        let eq: Vec<f64> = (0..100)
            .map(|i| 100.0 * (1.0 + 0.001 * i as f64) + if i % 2 == 0 { 0.05 } else { -0.05 })
            .collect();
        assert!(sharpe_ratio(&eq, 252.0) > 0.0);
    }

    #[test]
    fn sortino_zero_without_downside() {
        let eq: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        assert_eq!(sortino_ratio(&eq, 252.0), 0.0);
    }

    #[test]
    fn max_drawdown_magnitude_and_duration() {
        let (dd, dur) = max_drawdown(&[100.0, 120.0, 90.0, 100.0, 130.0, 117.0]);
        assert!((dd - 25.0).abs() < 1e-10);
        assert_eq!(dur, 2);
        assert_eq!(max_drawdown(&[100.0, 101.0, 102.0]), (0.0, 0));
        assert_eq!(max_drawdown(&[]), (0.0, 0));
    }

    #[test]
    fn win_rate_and_profit_factor_conventions() {
        assert_eq!(win_rate(&[]), 0.0);
        assert_eq!(profit_factor(&[]), 0.0);

        let wins = vec![make_trade(50.0, 0, 5), make_trade(25.0, 6, 8)];
        assert_eq!(win_rate(&wins), 100.0);
        assert_eq!(profit_factor(&wins), PROFIT_FACTOR_CAP);

        let losses = vec![make_trade(-10.0, 0, 2)];
        assert_eq!(win_rate(&losses), 0.0);
        assert_eq!(profit_factor(&losses), 0.0);

        let mixed = vec![make_trade(30.0, 0, 2), make_trade(-10.0, 3, 4)];
        assert_eq!(win_rate(&mixed), 50.0);
        assert!((profit_factor(&mixed) - 3.0).abs() < 1e-10);
    }

    #[test]
    fn breakeven_trade_counts_as_loser() {
        let r = make_result(&[100.0, 100.0, 100.0], vec![make_trade(0.0, 0, 1)]);
        let m = Metrics::compute(&r, Some(252.0));
        assert_eq!(m.winning_trades, 0);
        assert_eq!(m.losing_trades, 1);
        assert_eq!(m.profit_factor, 0.0);
    }

    #[test]
    fn inferred_annualization() {
        assert_eq!(infer_periods_per_year(&daily(30)), 252.0);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let hourly: Vec<_> = (0..30).map(|i| t0 + Duration::hours(i)).collect();
        assert!((infer_periods_per_year(&hourly) - 8760.0).abs() < 1e-9);
        let weekly: Vec<_> = (0..30).map(|i| t0 + Duration::weeks(i)).collect();
        assert_eq!(infer_periods_per_year(&weekly), 52.0);
        assert_eq!(infer_periods_per_year(&[]), DEFAULT_PERIODS_PER_YEAR);
    }

    #[test]
    fn compute_is_pure() {
        let r = make_result(
            &[10_000.0, 10_100.0, 9_950.0, 10_300.0, 10_250.0],
            vec![make_trade(120.0, 0, 2), make_trade(-40.0, 2, 4)],
        );
        let a = Metrics::compute(&r, None);
        let b = Metrics::compute(&r, None);
        assert_eq!(a, b);
        assert_eq!(a.total_trades, 2);
        assert!((a.avg_trade_pnl - 40.0).abs() < 1e-10);
        assert!((a.avg_bars_held - 2.0).abs() < 1e-10);
        assert!((a.exposure_pct - 80.0).abs() < 1e-10);
        assert_eq!(a.largest_loss, -40.0);
    }

    #[test]
    fn empty_run_degrades_to_fallbacks() {
        let r = make_result(&[10_000.0], vec![]);
        let m = Metrics::compute(&r, None);
        assert_eq!(m.total_return_pct, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.avg_win, 0.0);
        assert_eq!(m.periods_per_year, DEFAULT_PERIODS_PER_YEAR);
    }
}
