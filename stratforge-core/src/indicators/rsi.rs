//! Relative Strength Index (RSI).
//!
//! Wilder-smoothed average gain over average loss.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss). Lookback: period.
//! avg_loss == 0 gives 100 (or 50 on a flat series); avg_gain == 0 gives 0.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::series::{closes, diff, wilder};

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: Self::key(period),
        }
    }

    pub fn key(period: usize) -> String {
        format!("rsi_{period}")
    }
}

/// RSI over a raw close series.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    let changes = diff(values, 1);
    let gains: Vec<f64> = changes.iter().map(|c| if c.is_nan() { *c } else { c.max(0.0) }).collect();
    let losses: Vec<f64> = changes.iter().map(|c| if c.is_nan() { *c } else { (-c).max(0.0) }).collect();
    let avg_gain = wilder(&gains, period);
    let avg_loss = wilder(&losses, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(&g, &l)| {
            if g.is_nan() || l.is_nan() {
                f64::NAN
            } else if l == 0.0 && g == 0.0 {
                50.0
            } else if l == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + g / l)
            }
        })
        .collect()
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        rsi(&closes(bars), self.period)
    }
}
