//! Live engine errors.
//!
//! `ExecutionFault` is what an order executor returns; it never stops the
//! engine. `LiveError` covers refused transitions and faults that move the
//! engine to ERROR.

use stratforge_core::error::{ConfigError, DataError, EngineError};
use thiserror::Error;

use crate::state::EngineState;

/// A failed order submission. The ledger is left untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionFault {
    #[error("order rejected: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid fill: {0}")]
    InvalidFill(String),
}

#[derive(Debug, Error)]
pub enum LiveError {
    #[error("engine is already running")]
    AlreadyRunning,
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: EngineState, to: EngineState },
    #[error("configuration fault: {0}")]
    Config(#[from] ConfigError),
    #[error("data fault: {0}")]
    Data(#[from] DataError),
}

impl From<EngineError> for LiveError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config(e) => LiveError::Config(e),
            EngineError::Data(e) => LiveError::Data(e),
        }
    }
}
