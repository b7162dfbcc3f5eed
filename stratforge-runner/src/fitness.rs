//! Fitness function — configurable metric selector for parameter search.

use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;

/// Which metric the optimizer scores trials by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitnessMetric {
    #[default]
    SharpeRatio,
    SortinoRatio,
    TotalReturnPct,
    AnnualizedReturnPct,
    MaxDrawdownPct,
    WinRate,
    ProfitFactor,
    TotalTrades,
    AvgTradePnl,
}

impl FitnessMetric {
    pub const ALL: [FitnessMetric; 9] = [
        Self::SharpeRatio,
        Self::SortinoRatio,
        Self::TotalReturnPct,
        Self::AnnualizedReturnPct,
        Self::MaxDrawdownPct,
        Self::WinRate,
        Self::ProfitFactor,
        Self::TotalTrades,
        Self::AvgTradePnl,
    ];

    /// Extract the relevant value from a `Metrics` struct.
    pub fn extract(&self, metrics: &Metrics) -> f64 {
        match self {
            Self::SharpeRatio => metrics.sharpe_ratio,
            Self::SortinoRatio => metrics.sortino_ratio,
            Self::TotalReturnPct => metrics.total_return_pct,
            Self::AnnualizedReturnPct => metrics.annualized_return_pct,
            Self::MaxDrawdownPct => metrics.max_drawdown_pct,
            Self::WinRate => metrics.win_rate,
            Self::ProfitFactor => metrics.profit_factor,
            Self::TotalTrades => metrics.total_trades as f64,
            Self::AvgTradePnl => metrics.avg_trade_pnl,
        }
    }

    /// Natural direction: drawdown is a positive magnitude, so lower is better.
    pub fn is_higher_better(&self) -> bool {
        !matches!(self, Self::MaxDrawdownPct)
    }

    pub fn natural_direction(&self) -> Direction {
        if self.is_higher_better() {
            Direction::Maximize
        } else {
            Direction::Minimize
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SharpeRatio => "sharpe_ratio",
            Self::SortinoRatio => "sortino_ratio",
            Self::TotalReturnPct => "total_return_pct",
            Self::AnnualizedReturnPct => "annualized_return_pct",
            Self::MaxDrawdownPct => "max_drawdown_pct",
            Self::WinRate => "win_rate",
            Self::ProfitFactor => "profit_factor",
            Self::TotalTrades => "total_trades",
            Self::AvgTradePnl => "avg_trade_pnl",
        }
    }

    /// Parse a metric by its field name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

impl std::fmt::Display for FitnessMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Search direction. Overrides the metric's natural direction when set
/// explicitly in the optimizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    /// True if `a` is strictly better than `b`. NaN is never better than
    /// anything, and anything finite beats NaN.
    pub fn is_better(&self, a: f64, b: f64) -> bool {
        match (a.is_nan(), b.is_nan()) {
            (true, _) => false,
            (false, true) => true,
            _ => match self {
                Direction::Maximize => a > b,
                Direction::Minimize => a < b,
            },
        }
    }

    /// Value every real score beats, used to seed a running best.
    pub fn worst(&self) -> f64 {
        match self {
            Direction::Maximize => f64::NEG_INFINITY,
            Direction::Minimize => f64::INFINITY,
        }
    }
}
