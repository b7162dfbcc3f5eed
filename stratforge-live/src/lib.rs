//! StratForge Live — the backtest decision path driven by a live bar feed.
//!
//! - Engine lifecycle (INITIALIZING → RUNNING → STOPPED / ERROR)
//! - Live, paper and dry-run execution modes
//! - Async bar feed and order executor collaborators
//! - Cloneable handle for stop, status, trades and balance queries
//! - Backtest/paper parity check

pub mod engine;
pub mod error;
pub mod executor;
pub mod feed;
pub mod handle;
pub mod parity;
pub mod state;

pub use engine::{LiveConfig, LiveEngine};
pub use error::{ExecutionFault, LiveError};
pub use executor::OrderExecutor;
pub use feed::{BarFeed, ChannelFeed, ReplayFeed};
pub use handle::{Balance, LiveEvent, LiveHandle, LiveStatus};
pub use parity::{compare_with_backtest, ParityReport, DEFAULT_TOLERANCE_PCT};
pub use state::{EngineState, TradingMode};
