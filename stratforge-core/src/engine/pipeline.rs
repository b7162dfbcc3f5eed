//! Signal pipeline — strategy plus filter chain, with fault isolation.
//!
//! A fault raised by strategy or filter code (an `Err` or a panic) is caught
//! here, recorded on a `FaultTracker`, and the bar is treated as HOLD. The
//! ledger never sees a half-evaluated signal.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, warn};

use crate::components::chain::FilterChain;
use crate::components::filter::FilterContext;
use crate::components::indicator::IndicatorValues;
use crate::components::strategy::Strategy;
use crate::domain::{Bar, FaultSummary, Health, TradeSignal};
use crate::error::StrategyFault;

/// Fault messages kept for diagnosis.
const MAX_FAULT_SAMPLES: usize = 10;

#[derive(Debug, Clone)]
pub struct FaultTracker {
    total: usize,
    consecutive: usize,
    max_consecutive: usize,
    threshold: usize,
    degraded: bool,
    samples: Vec<String>,
}

impl FaultTracker {
    pub fn new(threshold: usize) -> Self {
        Self {
            total: 0,
            consecutive: 0,
            max_consecutive: 0,
            threshold: threshold.max(1),
            degraded: false,
            samples: Vec::new(),
        }
    }

    pub fn record(&mut self, fault: &StrategyFault) {
        self.total += 1;
        self.consecutive += 1;
        self.max_consecutive = self.max_consecutive.max(self.consecutive);
        if self.samples.len() < MAX_FAULT_SAMPLES {
            self.samples.push(fault.to_string());
        }
        warn!(
            component = %fault.component,
            bar = fault.bar_index,
            message = %fault.message,
            "strategy fault, bar treated as HOLD"
        );
        if !self.degraded && self.consecutive >= self.threshold {
            self.degraded = true;
            error!(
                consecutive = self.consecutive,
                threshold = self.threshold,
                "signal pipeline degraded"
            );
        }
    }

    /// A bar evaluated cleanly.
    pub fn clear(&mut self) {
        self.consecutive = 0;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }

    /// Degraded once the threshold has been reached; stays degraded.
    pub fn health(&self) -> Health {
        if self.degraded {
            Health::Degraded
        } else {
            Health::Healthy
        }
    }

    pub fn summary(&self) -> FaultSummary {
        FaultSummary {
            total: self.total,
            max_consecutive: self.max_consecutive,
            health: self.health(),
            samples: self.samples.clone(),
        }
    }
}

/// Strategy + filters over one bar series.
pub struct SignalPipeline<'a> {
    strategy: &'a dyn Strategy,
    chain: &'a FilterChain,
    context: &'a FilterContext,
    strategy_values: IndicatorValues,
    filter_values: Vec<IndicatorValues>,
    required_history: usize,
}

impl<'a> SignalPipeline<'a> {
    pub fn new(strategy: &'a dyn Strategy, chain: &'a FilterChain, context: &'a FilterContext) -> Self {
        Self {
            strategy,
            chain,
            context,
            strategy_values: IndicatorValues::new(),
            filter_values: Vec::new(),
            required_history: strategy.required_history().max(chain.required_history()),
        }
    }

    /// Bars before which every output is HOLD.
    pub fn required_history(&self) -> usize {
        self.required_history
    }

    /// Precompute strategy and filter columns for `bars`.
    ///
    /// A panic during precompute leaves empty columns and is reported as a fault.
    pub fn prepare(&mut self, bars: &[Bar]) -> Result<(), StrategyFault> {
        let strategy = self.strategy;
        let chain = self.chain;
        let last = bars.len().saturating_sub(1);
        let computed = catch_unwind(AssertUnwindSafe(|| {
            (strategy.precompute(bars), chain.precompute(bars))
        }));
        match computed {
            Ok((strategy_values, filter_values)) => {
                self.strategy_values = strategy_values;
                self.filter_values = filter_values;
                Ok(())
            }
            Err(payload) => {
                self.strategy_values = IndicatorValues::new();
                self.filter_values = Vec::new();
                Err(StrategyFault::new(
                    strategy.name(),
                    last,
                    format!("precompute panicked: {}", panic_message(payload.as_ref())),
                ))
            }
        }
    }

    /// Final signal for `bars[index]`. Faults are recorded and yield HOLD.
    pub fn signal_at(&self, bars: &[Bar], index: usize, faults: &mut FaultTracker) -> TradeSignal {
        if index < self.required_history {
            return TradeSignal::hold();
        }
        match self.evaluate(bars, index) {
            Ok(signal) => {
                faults.clear();
                signal
            }
            Err(fault) => {
                faults.record(&fault);
                TradeSignal::hold()
            }
        }
    }

    fn evaluate(&self, bars: &[Bar], index: usize) -> Result<TradeSignal, StrategyFault> {
        let name = self.strategy.name();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let signal = self.strategy.analyze(bars, index, &self.strategy_values)?;
            self.chain
                .apply(signal, bars, index, &self.filter_values, self.context)
        }));
        match outcome {
            Ok(result) => result,
            Err(payload) => Err(StrategyFault::new(
                name,
                index,
                format!("panicked: {}", panic_message(payload.as_ref())),
            )),
        }
    }
}

impl std::fmt::Debug for SignalPipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalPipeline")
            .field("strategy", &self.strategy.name())
            .field("filters", &self.chain.names())
            .field("required_history", &self.required_history)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
