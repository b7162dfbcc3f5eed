//! Engine lifecycle and execution modes.
//!
//! INITIALIZING → RUNNING → STOPPED, RUNNING → ERROR. STOPPED and ERROR are
//! terminal; a supervisor restarts by building a new engine. A stop request
//! before start moves INITIALIZING straight to STOPPED.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Initializing,
    Running,
    Stopped,
    Error,
}

impl EngineState {
    pub fn can_transition_to(self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Initializing, Running) | (Initializing, Stopped) | (Running, Stopped) | (Running, Error)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EngineState::Stopped | EngineState::Error)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EngineState::Initializing => "INITIALIZING",
            EngineState::Running => "RUNNING",
            EngineState::Stopped => "STOPPED",
            EngineState::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Where decisions go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    /// Orders go to the external executor; the ledger follows confirmed fills.
    Live,
    /// Fills are simulated locally with the backtest cost model.
    #[default]
    Paper,
    /// Decisions are logged only; the ledger never changes.
    DryRun,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        use EngineState::*;
        assert!(Initializing.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopped));
        assert!(Running.can_transition_to(Error));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Error.can_transition_to(Running));
        assert!(!Initializing.can_transition_to(Error));
        assert!(Stopped.is_terminal() && Error.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn display_is_uppercase() {
        assert_eq!(EngineState::Running.to_string(), "RUNNING");
    }
}
