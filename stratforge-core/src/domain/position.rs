use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::Signal;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Side opened by an actionable signal.
    pub fn from_signal(signal: Signal) -> Option<Side> {
        match signal {
            Signal::Buy => Some(Side::Long),
            Signal::Sell => Some(Side::Short),
            Signal::Hold => None,
        }
    }

    /// Signal that closes a position on this side.
    pub fn closing_signal(&self) -> Signal {
        match self {
            Side::Long => Signal::Sell,
            Side::Short => Signal::Buy,
        }
    }

    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

/// The single open position of a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    /// Fill price after slippage.
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub entry_time: DateTime<Utc>,
    pub entry_index: usize,
    pub entry_fee: f64,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.side == Side::Long
    }

    /// Signed market value at `price` (negative for shorts).
    pub fn market_value(&self, price: f64) -> f64 {
        self.side.sign() * self.size * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * self.size * (price - self.entry_price)
    }
}
