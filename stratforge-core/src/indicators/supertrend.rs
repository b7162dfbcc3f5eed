//! Supertrend — ATR band that trails price and flips on a close through it.
//!
//! Output is the active band: the lower band (support) while trending up,
//! the upper band (resistance) while trending down. Bands only tighten while
//! the previous close stays on their side. Starts trending up at the first
//! valid ATR. Lookback: period - 1, same as ATR.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::series::{true_range, wilder};

#[derive(Debug, Clone)]
pub struct Supertrend {
    period: usize,
    multiplier: f64,
    name: String,
}

impl Supertrend {
    pub fn new(period: usize, multiplier: f64) -> Self {
        let period = period.max(1);
        Self {
            period,
            multiplier,
            name: Self::key(period, multiplier),
        }
    }

    pub fn key(period: usize, multiplier: f64) -> String {
        format!("supertrend_{period}_{multiplier}")
    }
}

impl Indicator for Supertrend {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut out = vec![f64::NAN; n];
        let atr = wilder(&true_range(bars), self.period);
        let Some(start) = atr.iter().position(|v| v.is_finite()) else {
            return out;
        };

        let hl2 = (bars[start].high + bars[start].low) / 2.0;
        let mut upper = hl2 + self.multiplier * atr[start];
        let mut lower = hl2 - self.multiplier * atr[start];
        let mut trending_up = true;
        out[start] = lower;

        for i in (start + 1)..n {
            if !atr[i].is_finite() || !bars[i].close.is_finite() {
                // Invalid input ends the series; later values would be seeded from nothing.
                break;
            }
            let hl2 = (bars[i].high + bars[i].low) / 2.0;
            let basic_upper = hl2 + self.multiplier * atr[i];
            let basic_lower = hl2 - self.multiplier * atr[i];

            let prev_close = bars[i - 1].close;
            upper = if prev_close <= upper {
                basic_upper.min(upper)
            } else {
                basic_upper
            };
            lower = if prev_close >= lower {
                basic_lower.max(lower)
            } else {
                basic_lower
            };

            if trending_up && bars[i].close < lower {
                trending_up = false;
            } else if !trending_up && bars[i].close > upper {
                trending_up = true;
            }
            out[i] = if trending_up { lower } else { upper };
        }
        out
    }
}
