//! RunResult — immutable output of one backtest (or one paper session).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::params::ParameterSet;
use super::trade::Trade;

/// Equity observed at the close of one bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}

/// Health of the signal pipeline over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    #[default]
    Healthy,
    /// Consecutive strategy faults reached the configured threshold at least once.
    Degraded,
}

/// Strategy/filter fault accounting for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaultSummary {
    pub total: usize,
    pub max_consecutive: usize,
    pub health: Health,
    /// First few fault messages, for diagnosis.
    pub samples: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub strategy: String,
    pub params: ParameterSet,
    pub initial_capital: f64,
    pub final_capital: f64,
    /// One point per processed bar.
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub total_fees: f64,
    pub faults: FaultSummary,
}

impl RunResult {
    pub fn equity_values(&self) -> Vec<f64> {
        self.equity_curve.iter().map(|p| p.equity).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.equity_curve.iter().map(|p| p.timestamp).collect()
    }

    /// (final - initial) / initial, in percent.
    pub fn total_return_pct(&self) -> f64 {
        if self.initial_capital <= 0.0 {
            return 0.0;
        }
        (self.final_capital - self.initial_capital) / self.initial_capital * 100.0
    }
}
