//! Signal and TradeSignal — directional intent for the next bar.
//!
//! A `TradeSignal` is produced fresh for every bar and never mutated after it
//! leaves the component that built it. Filters that downgrade a signal return
//! a new value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Directional trading intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// The signal that closes a position opened by `self`.
    pub fn opposite(&self) -> Signal {
        match self {
            Signal::Buy => Signal::Sell,
            Signal::Sell => Signal::Buy,
            Signal::Hold => Signal::Hold,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// Signal metadata. Ordered so serialized output is stable.
pub type SignalMetadata = BTreeMap<String, Value>;

/// Output of a strategy (and of the filter chain) for one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub signal: Signal,
    /// Conviction in [0, 1].
    pub strength: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    #[serde(default)]
    pub metadata: SignalMetadata,
}

impl TradeSignal {
    pub fn new(signal: Signal, strength: f64) -> Self {
        let strength = if strength.is_finite() {
            strength.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            signal,
            strength,
            stop_loss: None,
            take_profit: None,
            metadata: SignalMetadata::new(),
        }
    }

    pub fn hold() -> Self {
        Self::new(Signal::Hold, 0.0)
    }

    pub fn buy(strength: f64) -> Self {
        Self::new(Signal::Buy, strength)
    }

    pub fn sell(strength: f64) -> Self {
        Self::new(Signal::Sell, strength)
    }

    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: f64) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// BUY or SELL.
    pub fn is_actionable(&self) -> bool {
        !matches!(self.signal, Signal::Hold)
    }

    /// A HOLD that keeps this signal's metadata and records why it was blocked.
    pub fn blocked(&self, reason: impl Into<String>) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.insert("filtered".into(), Value::Bool(true));
        metadata.insert("filter_reason".into(), Value::String(reason.into()));
        metadata.insert(
            "original_signal".into(),
            Value::String(self.signal.to_string()),
        );
        Self {
            signal: Signal::Hold,
            strength: 0.0,
            stop_loss: None,
            take_profit: None,
            metadata,
        }
    }
}

impl Default for TradeSignal {
    fn default() -> Self {
        Self::hold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strength_is_clamped() {
        assert_eq!(TradeSignal::buy(3.0).strength, 1.0);
        assert_eq!(TradeSignal::sell(-1.0).strength, 0.0);
        assert_eq!(TradeSignal::buy(f64::NAN).strength, 0.0);
    }

    #[test]
    fn builders_attach_levels() {
        let s = TradeSignal::buy(0.5)
            .with_stop_loss(95.0)
            .with_take_profit(110.0)
            .with_meta("crossover", "golden");
        assert_eq!(s.stop_loss, Some(95.0));
        assert_eq!(s.take_profit, Some(110.0));
        assert_eq!(s.metadata["crossover"], Value::from("golden"));
        assert!(s.is_actionable());
    }

    #[test]
    fn blocked_signal_is_hold_with_reason() {
        let s = TradeSignal::sell(0.8).with_stop_loss(120.0);
        let b = s.blocked("regime");
        assert_eq!(b.signal, Signal::Hold);
        assert_eq!(b.strength, 0.0);
        assert_eq!(b.stop_loss, None);
        assert_eq!(b.metadata["filtered"], Value::Bool(true));
        assert_eq!(b.metadata["filter_reason"], Value::from("regime"));
        assert_eq!(b.metadata["original_signal"], Value::from("SELL"));
    }

    #[test]
    fn signal_serializes_upper_case() {
        let json = serde_json::to_string(&Signal::Buy).unwrap();
        assert_eq!(json, "\"BUY\"");
        assert_eq!(Signal::Buy.opposite(), Signal::Sell);
    }
}
