use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MarkovError;

pub const NUM_STATES: usize = 5;

/// Discretized day-over-day price move.
/// Indices are fixed: they address rows and columns of the transition matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceState {
    SmallIncrease = 0,
    LargeIncrease = 1,
    SmallDecrease = 2,
    LargeDecrease = 3,
    NoChange = 4,
}

impl PriceState {
    pub const ALL: [PriceState; NUM_STATES] = [
        PriceState::SmallIncrease,
        PriceState::LargeIncrease,
        PriceState::SmallDecrease,
        PriceState::LargeDecrease,
        PriceState::NoChange,
    ];

    /// Classify a signed percentage change against a magnitude threshold.
    ///
    /// Only an exactly-zero change is `NoChange`; any nonzero change below the
    /// threshold is a small move, anything at or above it is a large move.
    pub fn classify(diff: f64, threshold: f64) -> Self {
        if diff == 0.0 {
            return PriceState::NoChange;
        }
        if diff.abs() >= threshold {
            if diff > 0.0 {
                PriceState::LargeIncrease
            } else {
                PriceState::LargeDecrease
            }
        } else if diff > 0.0 {
            PriceState::SmallIncrease
        } else {
            PriceState::SmallDecrease
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceState::SmallIncrease => "small_increase",
            PriceState::LargeIncrease => "large_increase",
            PriceState::SmallDecrease => "small_decrease",
            PriceState::LargeDecrease => "large_decrease",
            PriceState::NoChange => "no_change",
        }
    }
}

impl fmt::Display for PriceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceState {
    type Err = MarkovError;

    /// Accepts a state index (`0`..`4`) or a name such as `large_increase` / `large-increase`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(index) = trimmed.parse::<i64>() {
            return usize::try_from(index)
                .ok()
                .and_then(PriceState::from_index)
                .ok_or_else(|| {
                    MarkovError::invalid(format!("state index {} out of range 0..{}", index, NUM_STATES))
                });
        }

        let name = trimmed.to_ascii_lowercase().replace('-', "_");
        PriceState::ALL
            .into_iter()
            .find(|state| state.as_str() == name)
            .ok_or_else(|| MarkovError::invalid(format!("unknown state: {}", s)))
    }
}
