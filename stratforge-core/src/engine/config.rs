//! Backtest configuration. Every run takes one explicitly; there is no global state.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

use super::cost_model::CostModel;

/// Configuration for a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Fraction of available cash committed per entry, in (0, 1].
    pub position_size: f64,
    /// Fee per side, in percent of notional (0.1 = 0.1%).
    pub fee_percent: f64,
    /// Adverse price adjustment per fill, in percent.
    pub slippage_percent: f64,
    /// Open shorts on SELL while flat.
    pub allow_short: bool,
    /// Annualization factor for metrics. `None` infers it from bar spacing.
    pub periods_per_year: Option<f64>,
    /// Consecutive strategy faults before health degrades.
    pub fault_threshold: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            position_size: 1.0,
            fee_percent: 0.1,
            slippage_percent: 0.05,
            allow_short: true,
            periods_per_year: None,
            fault_threshold: 5,
        }
    }
}

impl BacktestConfig {
    /// Zero fees and slippage; handy for tests with exact expectations.
    pub fn frictionless() -> Self {
        Self {
            fee_percent: 0.0,
            slippage_percent: 0.0,
            ..Self::default()
        }
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.fee_percent, self.slippage_percent)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_capital.is_finite() || self.initial_capital <= 0.0 {
            return Err(ConfigError::setting(
                "initial_capital",
                format!("must be positive, got {}", self.initial_capital),
            ));
        }
        if !(self.position_size > 0.0 && self.position_size <= 1.0) {
            return Err(ConfigError::setting(
                "position_size",
                format!("must lie in (0, 1], got {}", self.position_size),
            ));
        }
        if !self.fee_percent.is_finite() || !(0.0..100.0).contains(&self.fee_percent) {
            return Err(ConfigError::setting(
                "fee_percent",
                format!("must lie in [0, 100), got {}", self.fee_percent),
            ));
        }
        if !self.slippage_percent.is_finite() || !(0.0..100.0).contains(&self.slippage_percent) {
            return Err(ConfigError::setting(
                "slippage_percent",
                format!("must lie in [0, 100), got {}", self.slippage_percent),
            ));
        }
        if let Some(p) = self.periods_per_year {
            if !p.is_finite() || p <= 0.0 {
                return Err(ConfigError::setting(
                    "periods_per_year",
                    format!("must be positive, got {p}"),
                ));
            }
        }
        if self.fault_threshold == 0 {
            return Err(ConfigError::setting("fault_threshold", "must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = BacktestConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.initial_capital, 10_000.0);
        assert_eq!(c.fault_threshold, 5);
    }

    #[test]
    fn rejects_bad_settings() {
        let bad = [
            BacktestConfig {
                initial_capital: 0.0,
                ..Default::default()
            },
            BacktestConfig {
                position_size: 1.5,
                ..Default::default()
            },
            BacktestConfig {
                fee_percent: -0.1,
                ..Default::default()
            },
            BacktestConfig {
                slippage_percent: f64::NAN,
                ..Default::default()
            },
            BacktestConfig {
                periods_per_year: Some(0.0),
                ..Default::default()
            },
        ];
        for c in bad {
            assert!(matches!(
                c.validate(),
                Err(ConfigError::InvalidSetting { .. })
            ));
        }
    }

    #[test]
    fn partial_toml_like_json_fills_defaults() {
        let c: BacktestConfig = serde_json::from_str(r#"{"fee_percent": 0.2}"#).unwrap();
        assert_eq!(c.fee_percent, 0.2);
        assert_eq!(c.slippage_percent, 0.05);
        assert!(c.allow_short);
    }
}
