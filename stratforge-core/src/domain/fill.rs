use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::order::OrderSide;

/// Confirmation of an executed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub timestamp: DateTime<Utc>,
    pub side: OrderSide,
    /// Executed price, slippage included.
    pub price: f64,
    pub size: f64,
    pub fee: f64,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }

    /// Finite, positive price and size, non-negative fee.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite()
            && self.price > 0.0
            && self.size.is_finite()
            && self.size > 0.0
            && self.fee.is_finite()
            && self.fee >= 0.0
    }
}
