//! Error taxonomy shared by every engine entry point.
//!
//! Configuration and data faults reject a run before the first bar. Strategy
//! faults never escape the signal pipeline: they are recorded and the bar is
//! treated as HOLD.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Invalid parameters, schemas or engine settings.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("unknown filter type: {0}")]
    UnknownFilter(String),
    #[error("unknown parameter: {0}")]
    UnknownParam(String),
    #[error("missing parameter: {0}")]
    MissingParam(String),
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },
    #[error("invalid setting '{field}': {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn setting(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}

/// Malformed bar series. Bars are never silently dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("empty bar series")]
    Empty,
    #[error("non-monotonic timestamp at bar {index}: {previous} is not before {current}")]
    NonMonotonic {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    #[error("missing or non-finite value in bar {index} ({timestamp})")]
    MissingValue {
        index: usize,
        timestamp: DateTime<Utc>,
    },
    #[error("inconsistent OHLC in bar {index} ({timestamp}): {reason}")]
    Inconsistent {
        index: usize,
        timestamp: DateTime<Utc>,
        reason: String,
    },
}

/// A runtime fault originating in strategy or filter code.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{component} faulted at bar {bar_index}: {message}")]
pub struct StrategyFault {
    pub component: String,
    pub bar_index: usize,
    pub message: String,
}

impl StrategyFault {
    pub fn new(component: impl Into<String>, bar_index: usize, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            bar_index,
            message: message.into(),
        }
    }
}

/// Errors that stop a backtest from starting.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration fault: {0}")]
    Config(#[from] ConfigError),
    #[error("data fault: {0}")]
    Data(#[from] DataError),
}
