//! Order requests routed to an execution venue (or simulated locally).

use serde::{Deserialize, Serialize};

use super::position::Side;

/// Direction of an order, independent of the position it opens or closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Order that opens a position on `side`.
    pub fn entering(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order that closes a position on `side`.
    pub fn exiting(side: Side) -> Self {
        match side {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("buy"),
            OrderSide::Sell => f.write_str("sell"),
        }
    }
}

/// Generic order submission: side, size and an optional limit price.
///
/// `price` carries the reference price the engine expects to trade at; a
/// market order leaves it as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub size: f64,
    pub price: Option<f64>,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            price: None,
        }
    }

    pub fn limit(symbol: impl Into<String>, side: OrderSide, size: f64, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size,
            price: Some(price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_sides_for_positions() {
        assert_eq!(OrderSide::entering(Side::Long), OrderSide::Buy);
        assert_eq!(OrderSide::exiting(Side::Long), OrderSide::Sell);
        assert_eq!(OrderSide::entering(Side::Short), OrderSide::Sell);
        assert_eq!(OrderSide::exiting(Side::Short), OrderSide::Buy);
    }

    #[test]
    fn market_order_has_no_price() {
        let o = OrderRequest::market("BTC/USDT", OrderSide::Buy, 0.5);
        assert_eq!(o.price, None);
        let o = OrderRequest::limit("BTC/USDT", OrderSide::Sell, 0.5, 101.0);
        assert_eq!(o.price, Some(101.0));
    }
}
