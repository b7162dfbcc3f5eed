//! MACD — Moving Average Convergence Divergence.
//!
//! Line = EMA(close, fast) - EMA(close, slow); Signal = EMA(Line, signal);
//! Histogram = Line - Signal. Each output is its own Indicator instance.
//! Lookback: slow - 1 for the line, slow + signal - 2 for signal and histogram.

use crate::components::indicator::Indicator;
use crate::domain::Bar;

use super::series::{closes, ema};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdOutput {
    Line,
    Signal,
    Histogram,
}

impl MacdOutput {
    fn label(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Signal => "signal",
            Self::Histogram => "hist",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    output: MacdOutput,
    name: String,
}

impl Macd {
    pub fn new(fast: usize, slow: usize, signal: usize, output: MacdOutput) -> Self {
        let fast = fast.max(1);
        let slow = slow.max(fast + 1);
        let signal = signal.max(1);
        Self {
            fast,
            slow,
            signal,
            output,
            name: Self::key(output, fast, slow, signal),
        }
    }

    pub fn line(fast: usize, slow: usize, signal: usize) -> Self {
        Self::new(fast, slow, signal, MacdOutput::Line)
    }

    pub fn signal_line(fast: usize, slow: usize, signal: usize) -> Self {
        Self::new(fast, slow, signal, MacdOutput::Signal)
    }

    pub fn histogram(fast: usize, slow: usize, signal: usize) -> Self {
        Self::new(fast, slow, signal, MacdOutput::Histogram)
    }

    pub fn key(output: MacdOutput, fast: usize, slow: usize, signal: usize) -> String {
        format!("macd_{}_{fast}_{slow}_{signal}", output.label())
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        match self.output {
            MacdOutput::Line => self.slow - 1,
            MacdOutput::Signal | MacdOutput::Histogram => self.slow + self.signal - 2,
        }
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let close = closes(bars);
        let fast = ema(&close, self.fast);
        let slow = ema(&close, self.slow);
        let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
        if self.output == MacdOutput::Line {
            return line;
        }
        let signal = ema(&line, self.signal);
        match self.output {
            MacdOutput::Signal => signal,
            _ => line.iter().zip(&signal).map(|(l, s)| l - s).collect(),
        }
    }
}
