//! Domain types for the strategy engine.

pub mod bar;
pub mod fill;
pub mod order;
pub mod params;
pub mod position;
pub mod run;
pub mod series;
pub mod signal;
pub mod trade;

pub use bar::{resample, timeframe_duration, timeframe_minutes, Bar};
pub use fill::Fill;
pub use order::{OrderRequest, OrderSide};
pub use params::{ParamKind, ParamSchema, ParamSpec, ParamValue, ParameterSet};
pub use position::{Position, Side};
pub use run::{EquityPoint, FaultSummary, Health, RunResult};
pub use series::{validate_bar, validate_next, validate_series};
pub use signal::{Signal, SignalMetadata, TradeSignal};
pub use trade::{ExitReason, Trade};
