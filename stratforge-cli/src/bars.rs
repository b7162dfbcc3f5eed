//! CSV bar loading.
//!
//! Expected header: `timestamp,open,high,low,close,volume`. Timestamps are
//! RFC 3339, `YYYY-MM-DD` (midnight UTC) or unix seconds. The loaded series
//! is validated before it is returned; nothing is dropped or reordered.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use stratforge_core::domain::{validate_series, Bar};

#[derive(Debug, Deserialize)]
struct BarRecord {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

pub fn load_bars(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<BarRecord>().enumerate() {
        // Header is line 1.
        let line = i + 2;
        let record = record.with_context(|| format!("{}:{line}: bad row", path.display()))?;
        let timestamp = parse_timestamp(&record.timestamp)
            .with_context(|| format!("{}:{line}: bad timestamp", path.display()))?;
        bars.push(Bar::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        ));
    }
    validate_series(&bars).with_context(|| format!("{} is not a valid bar series", path.display()))?;
    Ok(bars)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    if let Ok(secs) = raw.parse::<i64>() {
        if let Some(ts) = DateTime::from_timestamp(secs, 0) {
            return Ok(ts);
        }
    }
    bail!("unrecognized timestamp '{raw}'")
}
