//! Engine handle — the query and control surface shared with other tasks.
//!
//! The engine publishes a snapshot after every bar; the handle reads it
//! without touching the ledger. Stop requests travel over a watch channel so
//! they are seen at the engine's next suspension point.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratforge_core::domain::{Health, Position, Signal, Trade};
use tokio::sync::{broadcast, watch};
use tracing::info;

use crate::state::{EngineState, TradingMode};

const EVENT_CAPACITY: usize = 256;

/// Point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStatus {
    pub state: EngineState,
    pub mode: TradingMode,
    pub symbol: String,
    pub position: Option<Position>,
    pub cash: f64,
    pub equity: f64,
    /// Equity minus initial capital.
    pub session_pnl: f64,
    pub trades_count: usize,
    pub health: Health,
    pub last_bar: Option<DateTime<Utc>>,
    pub bars_processed: usize,
    pub execution_faults: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub initial_capital: f64,
    pub cash: f64,
    pub equity: f64,
    /// Signed mark-to-market value of the open position.
    pub position_value: f64,
    pub total_fees: f64,
}

/// Notifications for observers (dashboards, alerting).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LiveEvent {
    StateChanged {
        from: EngineState,
        to: EngineState,
    },
    Signal {
        bar_index: usize,
        signal: Signal,
    },
    PositionOpened {
        position: Position,
    },
    TradeClosed {
        trade: Trade,
    },
    ExecutionFault {
        bar_index: usize,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub status: LiveStatus,
    pub balance: Balance,
    pub trades: Vec<Trade>,
}

#[derive(Debug)]
pub(crate) struct Shared {
    snapshot: Mutex<Snapshot>,
    stop_tx: watch::Sender<bool>,
    events: broadcast::Sender<LiveEvent>,
}

impl Shared {
    pub fn new(snapshot: Snapshot) -> (Arc<Self>, watch::Receiver<bool>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let shared = Arc::new(Self {
            snapshot: Mutex::new(snapshot),
            stop_tx,
            events,
        });
        (shared, stop_rx)
    }

    /// A panic while holding the lock leaves the last published snapshot,
    /// which is still consistent.
    pub fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> EngineState {
        self.lock().status.state
    }

    /// Move to `to` if the transition is allowed; returns the previous state
    /// on success.
    pub fn transition(&self, to: EngineState) -> Result<EngineState, EngineState> {
        let from = {
            let mut snapshot = self.lock();
            let from = snapshot.status.state;
            if !from.can_transition_to(to) {
                return Err(from);
            }
            snapshot.status.state = to;
            from
        };
        info!(%from, %to, "engine state changed");
        self.emit(LiveEvent::StateChanged { from, to });
        Ok(from)
    }

    pub fn emit(&self, event: LiveEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Cloneable control and query handle for a `LiveEngine`.
#[derive(Debug, Clone)]
pub struct LiveHandle {
    shared: Arc<Shared>,
}

impl LiveHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Ask the engine to stop. Repeated calls are no-ops. An engine that has
    /// not started yet goes straight to STOPPED.
    pub fn stop(&self) {
        if self.shared.state() == EngineState::Initializing {
            let _ = self.shared.transition(EngineState::Stopped);
        }
        self.shared.stop_tx.send_replace(true);
    }

    pub fn is_stop_requested(&self) -> bool {
        *self.shared.stop_tx.borrow()
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    pub fn status(&self) -> LiveStatus {
        self.shared.lock().status.clone()
    }

    pub fn balance(&self) -> Balance {
        self.shared.lock().balance
    }

    /// Closed trades of this session, oldest first.
    pub fn trades(&self) -> Vec<Trade> {
        self.shared.lock().trades.clone()
    }

    /// Receive events published from now on. A slow receiver loses the
    /// oldest events rather than blocking the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.shared.events.subscribe()
    }
}
