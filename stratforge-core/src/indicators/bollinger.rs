//! Bollinger Bands — moving average +/- standard deviation multiplier.
//!
//! Bands are separate Indicator instances:
//! - Middle: SMA(close, period)
//! - Upper / Lower: middle +/- mult * stddev(close, period)
//!
//! Sample stddev (n - 1). Lookback: period - 1.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::series::{closes, rolling_mean, rolling_std};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    Upper,
    Middle,
    Lower,
    /// (upper - lower) / middle
    Width,
}

impl BollingerBand {
    fn label(self) -> &'static str {
        match self {
            Self::Upper => "upper",
            Self::Middle => "middle",
            Self::Lower => "lower",
            Self::Width => "width",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
    name: String,
}

impl Bollinger {
    pub fn new(period: usize, multiplier: f64, band: BollingerBand) -> Self {
        let period = period.max(2);
        Self {
            period,
            multiplier,
            band,
            name: Self::key(band, period, multiplier),
        }
    }

    pub fn upper(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Upper)
    }

    pub fn middle(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Middle)
    }

    pub fn lower(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Lower)
    }

    pub fn width(period: usize, multiplier: f64) -> Self {
        Self::new(period, multiplier, BollingerBand::Width)
    }

    pub fn key(band: BollingerBand, period: usize, multiplier: f64) -> String {
        format!("bb_{}_{period}_{multiplier}", band.label())
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let c = closes(bars);
        let mid = rolling_mean(&c, self.period);
        if self.band == BollingerBand::Middle {
            return mid;
        }
        let sd = rolling_std(&c, self.period);
        mid.iter()
            .zip(&sd)
            .map(|(&m, &s)| {
                let half = self.multiplier * s;
                match self.band {
                    BollingerBand::Upper => m + half,
                    BollingerBand::Lower => m - half,
                    BollingerBand::Width if m != 0.0 => 2.0 * half / m,
                    BollingerBand::Width => f64::NAN,
                    BollingerBand::Middle => m,
                }
            })
            .collect()
    }
}
