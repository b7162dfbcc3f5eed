//! Cost model — slippage and fee calculation.
//!
//! Slippage is directional: buyers pay more (higher price), sellers receive less (lower price).
//! Fees are symmetric per side, in percent of the filled notional.

use crate::domain::OrderSide;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Fee per side, percent of notional.
    pub fee_percent: f64,
    /// Slippage in percent, applied directionally.
    pub slippage_percent: f64,
}

impl CostModel {
    pub fn new(fee_percent: f64, slippage_percent: f64) -> Self {
        Self {
            fee_percent,
            slippage_percent,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Apply slippage to a raw price for an order on `side`.
    pub fn fill_price(&self, side: OrderSide, price: f64) -> f64 {
        let slip = self.slippage_percent / 100.0;
        match side {
            OrderSide::Buy => price * (1.0 + slip),
            OrderSide::Sell => price * (1.0 - slip),
        }
    }

    /// `fee = notional * fee_percent / 100`
    pub fn fee(&self, notional: f64) -> f64 {
        notional * self.fee_percent / 100.0
    }
}
