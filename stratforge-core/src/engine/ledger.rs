//! Position ledger — cash, at most one open position, and the closed trades.
//!
//! Fills are applied as complete values (`Fill`), whether they were simulated
//! locally by `simulate_entry`/`simulate_exit` or confirmed by an external
//! executor. The ledger never holds a position for a fill it was not given.
//!
//! Cash identity after every call: `equity(mark) == cash + sign * size * mark`.

use chrono::{DateTime, Utc};

use crate::domain::{ExitReason, Fill, OrderSide, Position, Side, Trade};

use super::config::BacktestConfig;
use super::cost_model::CostModel;

#[derive(Debug, Clone)]
pub struct Ledger {
    initial_capital: f64,
    cash: f64,
    position: Option<Position>,
    trades: Vec<Trade>,
    total_fees: f64,
    costs: CostModel,
    position_size: f64,
}

impl Ledger {
    pub fn new(config: &BacktestConfig) -> Self {
        Self {
            initial_capital: config.initial_capital,
            cash: config.initial_capital,
            position: None,
            trades: Vec::new(),
            total_fees: 0.0,
            costs: config.cost_model(),
            position_size: config.position_size,
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    /// Cash plus the signed mark-to-market value of the open position.
    pub fn equity(&self, mark: f64) -> f64 {
        self.cash + self.position.as_ref().map_or(0.0, |p| p.market_value(mark))
    }

    /// Entry fill at `price` after slippage, sized from available cash net of fees.
    ///
    /// `None` when already in a position or there is nothing to commit.
    pub fn simulate_entry(&self, side: Side, price: f64, timestamp: DateTime<Utc>) -> Option<Fill> {
        if self.position.is_some() {
            return None;
        }
        let order_side = OrderSide::entering(side);
        let fill_price = self.costs.fill_price(order_side, price);
        let trade_capital = self.cash * self.position_size;
        let fee = self.costs.fee(trade_capital);
        let size = (trade_capital - fee) / fill_price;
        let fill = Fill {
            timestamp,
            side: order_side,
            price: fill_price,
            size,
            fee,
        };
        fill.is_valid().then_some(fill)
    }

    /// Exit fill for the whole open position at `price` after slippage.
    pub fn simulate_exit(&self, price: f64, timestamp: DateTime<Utc>) -> Option<Fill> {
        let position = self.position.as_ref()?;
        let order_side = OrderSide::exiting(position.side);
        let fill_price = self.costs.fill_price(order_side, price);
        let fee = self.costs.fee(position.size * fill_price);
        Some(Fill {
            timestamp,
            side: order_side,
            price: fill_price,
            size: position.size,
            fee,
        })
    }

    /// Open a position from an entry fill. Returns `None` (and changes
    /// nothing) if a position is already open or the fill is invalid.
    pub fn open(
        &mut self,
        side: Side,
        fill: &Fill,
        index: usize,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Option<&Position> {
        if self.position.is_some() || !fill.is_valid() {
            return None;
        }
        match side {
            Side::Long => self.cash -= fill.notional() + fill.fee,
            Side::Short => self.cash += fill.notional() - fill.fee,
        }
        self.total_fees += fill.fee;
        self.position = Some(Position {
            side,
            entry_price: fill.price,
            size: fill.size,
            stop_loss,
            take_profit,
            entry_time: fill.timestamp,
            entry_index: index,
            entry_fee: fill.fee,
        });
        self.position.as_ref()
    }

    /// Close the open position with an exit fill and record the trade.
    ///
    /// The fill must cover the whole position. A partial or invalid fill
    /// returns `None` and leaves the ledger unchanged.
    pub fn close(&mut self, fill: &Fill, index: usize, reason: ExitReason) -> Option<Trade> {
        let open = self.position.as_ref()?;
        if !fill.is_valid() || (fill.size - open.size).abs() > 1e-9 * open.size.max(1.0) {
            return None;
        }
        let position = self.position.take()?;
        let proceeds = position.size * fill.price;
        match position.side {
            Side::Long => self.cash += proceeds - fill.fee,
            Side::Short => self.cash -= proceeds + fill.fee,
        }
        self.total_fees += fill.fee;

        let gross_pnl = position.side.sign() * position.size * (fill.price - position.entry_price);
        let fees = position.entry_fee + fill.fee;
        let trade = Trade {
            side: position.side,
            entry_index: position.entry_index,
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            exit_index: index,
            exit_time: fill.timestamp,
            exit_price: fill.price,
            exit_reason: reason,
            size: position.size,
            gross_pnl,
            fees,
            pnl: gross_pnl - fees,
        };
        self.trades.push(trade.clone());
        Some(trade)
    }
}
