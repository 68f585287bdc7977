use serde::{Deserialize, Serialize};

use super::Symbol;

/// One simulated random walk. `prices[d]` is the price at the end of day `d + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationPath {
    /// 1-based path number within its run
    pub iteration: u32,
    pub prices: Vec<f64>,
}

impl SimulationPath {
    pub fn terminal_price(&self) -> Option<f64> {
        self.prices.last().copied()
    }
}

/// A batch of independent paths of equal length for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub symbol: Symbol,
    pub starting_price: f64,
    pub num_days: usize,
    pub paths: Vec<SimulationPath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerminalSummary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    /// Fraction of paths ending above the starting price
    pub up_fraction: f64,
}

impl SimulationRun {
    pub fn num_sims(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn terminal_summary(&self) -> Option<TerminalSummary> {
        let terminals: Vec<f64> = self.paths.iter().filter_map(|p| p.terminal_price()).collect();
        if terminals.is_empty() {
            return None;
        }

        let n = terminals.len() as f64;
        let min = terminals.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = terminals.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let mean = terminals.iter().sum::<f64>() / n;
        let up = terminals.iter().filter(|&&p| p > self.starting_price).count() as f64;

        Some(TerminalSummary {
            min,
            mean,
            max,
            up_fraction: up / n,
        })
    }
}
