//! Donchian channel — highest high / lowest low over a lookback window.
//!
//! Upper: max(high[t-period+1..=t]); Lower: min(low[t-period+1..=t]).
//! Lookback: period - 1.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::series::{rolling_max, rolling_min};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonchianBand {
    Upper,
    Lower,
}

#[derive(Debug, Clone)]
pub struct Donchian {
    period: usize,
    band: DonchianBand,
    name: String,
}

impl Donchian {
    pub fn upper(period: usize) -> Self {
        Self::new(period, DonchianBand::Upper)
    }

    pub fn lower(period: usize) -> Self {
        Self::new(period, DonchianBand::Lower)
    }

    fn new(period: usize, band: DonchianBand) -> Self {
        let period = period.max(1);
        Self {
            period,
            band,
            name: Self::key(band, period),
        }
    }

    pub fn key(band: DonchianBand, period: usize) -> String {
        match band {
            DonchianBand::Upper => format!("donchian_upper_{period}"),
            DonchianBand::Lower => format!("donchian_lower_{period}"),
        }
    }
}

impl Indicator for Donchian {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        match self.band {
            DonchianBand::Upper => {
                let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
                rolling_max(&highs, self.period)
            }
            DonchianBand::Lower => {
                let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
                rolling_min(&lows, self.period)
            }
        }
    }
}
