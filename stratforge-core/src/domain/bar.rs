//! Bar — one OHLCV sample for a fixed timeframe.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar. `timestamp` is the bar's open time.
///
/// Bars are produced by an external market data provider and never mutated
/// once they enter a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// Basic OHLC sanity: positive prices, high >= low, open/close inside the range.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }

    /// Whether `price` lies within this bar's traded range.
    pub fn touches(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }
}

/// Aggregate a base series into higher-timeframe bars of `minutes` length.
///
/// Buckets are aligned to the unix epoch, so a 4h bucket always starts at
/// 00:00, 04:00, ... UTC. The last bucket may be partial; callers that need
/// only completed buckets compare against the bucket end themselves.
pub fn resample(bars: &[Bar], minutes: i64) -> Vec<Bar> {
    if minutes <= 0 {
        return Vec::new();
    }
    let bucket_secs = minutes * 60;
    let mut out: Vec<Bar> = Vec::new();
    let mut current_bucket: Option<i64> = None;

    for bar in bars {
        let bucket = bar.timestamp.timestamp().div_euclid(bucket_secs);
        match (current_bucket, out.last_mut()) {
            (Some(b), Some(agg)) if b == bucket => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
            _ => {
                let start = DateTime::<Utc>::from_timestamp(bucket * bucket_secs, 0)
                    .unwrap_or(bar.timestamp);
                out.push(Bar::new(
                    start, bar.open, bar.high, bar.low, bar.close, bar.volume,
                ));
                current_bucket = Some(bucket);
            }
        }
    }
    out
}

/// Parse a timeframe label ("15m", "1h", "4h", "1d", "1w") into minutes.
pub fn timeframe_minutes(label: &str) -> Option<i64> {
    let label = label.trim();
    if label.len() < 2 {
        return None;
    }
    let (num, unit) = label.split_at(label.len() - 1);
    let n: i64 = num.parse().ok()?;
    let per_unit = match unit {
        "m" => 1,
        "h" => 60,
        "d" => 60 * 24,
        "w" => 60 * 24 * 7,
        _ => return None,
    };
    Some(n * per_unit)
}

/// Duration of a timeframe label, if recognised.
pub fn timeframe_duration(label: &str) -> Option<Duration> {
    timeframe_minutes(label).map(Duration::minutes)
}
