//! ADX — Average Directional Index (Wilder).
//!
//! +DM/-DM and TR are Wilder-smoothed, DX = 100 * |+DI - -DI| / (+DI + -DI),
//! and ADX is Wilder-smoothed DX. Lookback: 2 * period - 1.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::series::{true_range, wilder};

#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
    name: String,
}

impl Adx {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: Self::key(period),
        }
    }

    pub fn key(period: usize) -> String {
        format!("adx_{period}")
    }
}

fn directional_movement(bars: &[Bar]) -> (Vec<f64>, Vec<f64>) {
    let n = bars.len();
    let mut plus_dm = vec![f64::NAN; n];
    let mut minus_dm = vec![f64::NAN; n];
    for i in 1..n {
        let up = bars[i].high - bars[i - 1].high;
        let down = bars[i - 1].low - bars[i].low;
        if up.is_nan() || down.is_nan() {
            continue;
        }
        plus_dm[i] = if up > down && up > 0.0 { up } else { 0.0 };
        minus_dm[i] = if down > up && down > 0.0 { down } else { 0.0 };
    }
    (plus_dm, minus_dm)
}

impl Indicator for Adx {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        2 * self.period - 1
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        if n < 2 {
            return vec![f64::NAN; n];
        }

        let (plus_dm, minus_dm) = directional_movement(bars);
        // TR[0] has no previous close; align it with the DM series.
        let mut tr = true_range(bars);
        tr[0] = f64::NAN;

        let smooth_tr = wilder(&tr, self.period);
        let smooth_plus = wilder(&plus_dm, self.period);
        let smooth_minus = wilder(&minus_dm, self.period);

        let dx: Vec<f64> = (0..n)
            .map(|i| {
                let (t, p, m) = (smooth_tr[i], smooth_plus[i], smooth_minus[i]);
                if t.is_nan() || p.is_nan() || m.is_nan() || t == 0.0 {
                    return f64::NAN;
                }
                let plus_di = 100.0 * p / t;
                let minus_di = 100.0 * m / t;
                let sum = plus_di + minus_di;
                if sum == 0.0 {
                    0.0
                } else {
                    100.0 * (plus_di - minus_di).abs() / sum
                }
            })
            .collect();

        wilder(&dx, self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    #[test]
    fn adx_bounds() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.3).sin() * 8.0).collect();
        let adx = Adx::new(14).compute(&make_bars(&closes));
        let valid: Vec<f64> = adx.iter().copied().filter(|v| !v.is_nan()).collect();
        assert!(!valid.is_empty());
        assert!(valid.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn adx_strong_trend_higher() {
        let trend: Vec<f64> = (0..80).map(|i| 100.0 + i as f64 * 2.0).collect();
        // Ranges step up then down in turn, so +DM and -DM alternate and cancel.
        let mut chop = make_bars(&vec![100.0; 80]);
        for (i, bar) in chop.iter_mut().enumerate() {
            let shift = if i % 2 == 0 { 0.0 } else { 2.0 };
            bar.high = 101.0 + shift;
            bar.low = 98.0 + shift;
            bar.open = 100.0;
            bar.close = 100.0;
        }
        let a = Adx::new(14).compute(&make_bars(&trend));
        let b = Adx::new(14).compute(&chop);
        assert!(a[79] > b[79], "trend {} vs chop {}", a[79], b[79]);
        assert!(a[79] > 25.0);
        assert!(b[79] < 20.0, "chop {}", b[79]);
    }

    #[test]
    fn adx_first_valid_at_lookback() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let adx = Adx::new(5);
        let out = adx.compute(&make_bars(&closes));
        assert!(out[adx.lookback()].is_finite());
        assert!(out[adx.lookback() - 1].is_nan());
    }

    #[test]
    fn adx_too_few_bars() {
        assert!(Adx::new(14).compute(&make_bars(&[100.0])).iter().all(|v| v.is_nan()));
    }
}
