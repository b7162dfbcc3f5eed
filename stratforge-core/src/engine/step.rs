//! Per-bar decision — what the ledger should do with this bar and signal.
//!
//! Shared by the backtest loop and the live engine so both paths make the
//! same decision for the same bar. Priority when in a position:
//! 1. Stop-loss (wins when stop and target are both touched)
//! 2. Take-profit
//! 3. Opposite signal, at the close
//! 4. Force close at the close of the final bar
//!
//! When flat, BUY opens a long and SELL opens a short if shorting is allowed.
//! Nothing is opened on the final bar.

use crate::domain::{Bar, ExitReason, Position, Side, TradeSignal};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarAction {
    None,
    Open {
        side: Side,
        /// Reference price before slippage.
        price: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
    Close {
        reason: ExitReason,
        /// Reference price before slippage.
        price: f64,
    },
}

/// Decide the action for `bar` at `index`.
///
/// A position is only checked against bars after the one it was opened on.
pub fn plan_bar(
    position: Option<&Position>,
    bar: &Bar,
    index: usize,
    signal: &TradeSignal,
    allow_short: bool,
    is_last: bool,
) -> BarAction {
    match position {
        Some(position) => plan_exit(position, bar, index, signal, is_last),
        None => plan_entry(bar, signal, allow_short, is_last),
    }
}

fn plan_exit(
    position: &Position,
    bar: &Bar,
    index: usize,
    signal: &TradeSignal,
    is_last: bool,
) -> BarAction {
    if index <= position.entry_index {
        return BarAction::None;
    }
    let (stop_hit, target_hit) = match position.side {
        Side::Long => (
            position.stop_loss.filter(|&s| bar.low <= s),
            position.take_profit.filter(|&tp| bar.high >= tp),
        ),
        Side::Short => (
            position.stop_loss.filter(|&s| bar.high >= s),
            position.take_profit.filter(|&tp| bar.low <= tp),
        ),
    };
    if let Some(price) = stop_hit {
        return BarAction::Close {
            reason: ExitReason::StopLoss,
            price,
        };
    }
    if let Some(price) = target_hit {
        return BarAction::Close {
            reason: ExitReason::TakeProfit,
            price,
        };
    }
    if signal.signal == position.side.closing_signal() {
        return BarAction::Close {
            reason: ExitReason::Signal,
            price: bar.close,
        };
    }
    if is_last {
        return BarAction::Close {
            reason: ExitReason::EndOfData,
            price: bar.close,
        };
    }
    BarAction::None
}

fn plan_entry(bar: &Bar, signal: &TradeSignal, allow_short: bool, is_last: bool) -> BarAction {
    if is_last {
        return BarAction::None;
    }
    let Some(side) = Side::from_signal(signal.signal) else {
        return BarAction::None;
    };
    if side == Side::Short && !allow_short {
        return BarAction::None;
    }
    let level = |p: Option<f64>| p.filter(|v| v.is_finite() && *v > 0.0);
    BarAction::Open {
        side,
        price: bar.close,
        stop_loss: level(signal.stop_loss),
        take_profit: level(signal.take_profit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(low: f64, high: f64, close: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        Bar::new(ts, close, high, low, close, 100.0)
    }

    fn position(side: Side, stop: Option<f64>, target: Option<f64>) -> Position {
        Position {
            side,
            entry_price: 100.0,
            size: 1.0,
            stop_loss: stop,
            take_profit: target,
            entry_time: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            entry_index: 0,
            entry_fee: 0.0,
        }
    }

    #[test]
    fn stop_wins_when_both_touched() {
        let p = position(Side::Long, Some(95.0), Some(105.0));
        let action = plan_bar(Some(&p), &bar(94.0, 106.0, 100.0), 1, &TradeSignal::hold(), true, false);
        assert_eq!(
            action,
            BarAction::Close {
                reason: ExitReason::StopLoss,
                price: 95.0
            }
        );
    }

    #[test]
    fn short_levels_are_mirrored() {
        let p = position(Side::Short, Some(105.0), Some(95.0));
        let target = plan_bar(Some(&p), &bar(94.0, 101.0, 96.0), 1, &TradeSignal::hold(), true, false);
        assert_eq!(
            target,
            BarAction::Close {
                reason: ExitReason::TakeProfit,
                price: 95.0
            }
        );
        let stop = plan_bar(Some(&p), &bar(99.0, 105.5, 104.0), 1, &TradeSignal::hold(), true, false);
        assert!(matches!(stop, BarAction::Close { reason: ExitReason::StopLoss, .. }));
    }

    #[test]
    fn opposite_signal_closes_at_close() {
        let p = position(Side::Long, None, None);
        let action = plan_bar(Some(&p), &bar(99.0, 101.0, 100.5), 1, &TradeSignal::sell(1.0), true, false);
        assert_eq!(
            action,
            BarAction::Close {
                reason: ExitReason::Signal,
                price: 100.5
            }
        );
        // Same-direction signal keeps the position.
        let keep = plan_bar(Some(&p), &bar(99.0, 101.0, 100.5), 1, &TradeSignal::buy(1.0), true, false);
        assert_eq!(keep, BarAction::None);
    }

    #[test]
    fn final_bar_forces_close_and_blocks_entry() {
        let p = position(Side::Long, None, None);
        let action = plan_bar(Some(&p), &bar(99.0, 101.0, 100.0), 5, &TradeSignal::hold(), true, true);
        assert!(matches!(action, BarAction::Close { reason: ExitReason::EndOfData, .. }));
        let flat = plan_bar(None, &bar(99.0, 101.0, 100.0), 5, &TradeSignal::buy(1.0), true, true);
        assert_eq!(flat, BarAction::None);
    }

    #[test]
    fn entry_bar_is_not_checked() {
        let p = position(Side::Long, Some(99.5), None);
        let action = plan_bar(Some(&p), &bar(90.0, 101.0, 100.0), 0, &TradeSignal::sell(1.0), true, false);
        assert_eq!(action, BarAction::None);
    }

    #[test]
    fn short_entry_respects_allow_short() {
        let b = bar(99.0, 101.0, 100.0);
        assert_eq!(plan_bar(None, &b, 3, &TradeSignal::sell(1.0), false, false), BarAction::None);
        assert!(matches!(
            plan_bar(None, &b, 3, &TradeSignal::sell(1.0), true, false),
            BarAction::Open { side: Side::Short, .. }
        ));
    }

    #[test]
    fn entry_carries_levels() {
        let s = TradeSignal::buy(0.7)
            .with_stop_loss(95.0)
            .with_take_profit(f64::NAN);
        let action = plan_bar(None, &bar(99.0, 101.0, 100.0), 3, &s, true, false);
        assert_eq!(
            action,
            BarAction::Open {
                side: Side::Long,
                price: 100.0,
                stop_loss: Some(95.0),
                take_profit: None
            }
        );
    }
}
