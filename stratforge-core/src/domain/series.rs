//! Series validation — malformed input is rejected before a run starts.

use super::bar::Bar;
use crate::error::DataError;

/// Check a single bar in isolation.
pub fn validate_bar(index: usize, bar: &Bar) -> Result<(), DataError> {
    if bar.is_void() {
        return Err(DataError::MissingValue {
            index,
            timestamp: bar.timestamp,
        });
    }
    if bar.is_sane() {
        return Ok(());
    }
    let reason = if bar.low <= 0.0 {
        format!("non-positive low {}", bar.low)
    } else if bar.high < bar.low {
        format!("high {} below low {}", bar.high, bar.low)
    } else if bar.volume < 0.0 {
        format!("negative volume {}", bar.volume)
    } else {
        format!(
            "open {} / close {} outside [{}, {}]",
            bar.open, bar.close, bar.low, bar.high
        )
    };
    Err(DataError::Inconsistent {
        index,
        timestamp: bar.timestamp,
        reason,
    })
}

/// Check that `bar` may follow `previous` in a series.
pub fn validate_next(index: usize, previous: &Bar, bar: &Bar) -> Result<(), DataError> {
    if bar.timestamp <= previous.timestamp {
        return Err(DataError::NonMonotonic {
            index,
            previous: previous.timestamp,
            current: bar.timestamp,
        });
    }
    validate_bar(index, bar)
}

/// Validate a whole series: non-empty, sane bars, strictly increasing timestamps.
pub fn validate_series(bars: &[Bar]) -> Result<(), DataError> {
    let first = bars.first().ok_or(DataError::Empty)?;
    validate_bar(0, first)?;
    for (i, pair) in bars.windows(2).enumerate() {
        validate_next(i + 1, &pair[0], &pair[1])?;
    }
    Ok(())
}
