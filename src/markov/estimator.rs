use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{MarkovError, Result};
use crate::types::{FittedModel, PriceState, Symbol, NUM_STATES};

/// What to do with a state that was never left in the sample (its count row sums to zero).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroRowPolicy {
    /// Equal probability of moving to any state
    #[default]
    Uniform,
    /// The state is absorbing
    SelfLoop,
    /// Fail the estimation
    Reject,
}

#[derive(Debug, Clone, Default)]
pub struct ModelEstimator {
    zero_row_policy: ZeroRowPolicy,
}

impl ModelEstimator {
    pub fn new(zero_row_policy: ZeroRowPolicy) -> Self {
        Self { zero_row_policy }
    }

    /// Fit a chain from chronologically ascending closing prices.
    pub fn fit(&self, symbol: &Symbol, closes: &[f64]) -> Result<FittedModel> {
        if closes.len() < 2 {
            return Err(MarkovError::InsufficientData(format!(
                "{} has {} closing price(s), need at least 2",
                symbol,
                closes.len()
            )));
        }
        if let Some((i, p)) = closes.iter().enumerate().find(|(_, p)| !p.is_finite() || **p <= 0.0) {
            return Err(MarkovError::invalid(format!(
                "closing price #{} for {} must be finite and positive, got {}",
                i, symbol, p
            )));
        }

        let diffs = percentage_changes(closes);
        let average_change = average_abs_change(&diffs);
        let counts = count_transitions(&diffs, average_change);
        let transitions = normalize_counts(&counts, self.zero_row_policy)?;

        info!(
            "Fitted {} from {} closes: average change {:.4}%",
            symbol,
            closes.len(),
            average_change
        );

        FittedModel::new(symbol.clone(), average_change, transitions)
    }
}

/// `100 * (p[i+1] - p[i]) / p[i]` for each consecutive pair.
pub fn percentage_changes(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| 100.0 * (w[1] - w[0]) / w[0])
        .collect()
}

pub fn average_abs_change(diffs: &[f64]) -> f64 {
    if diffs.is_empty() {
        return 0.0;
    }
    diffs.iter().map(|d| d.abs()).sum::<f64>() / diffs.len() as f64
}

/// Count state-to-state transitions.
///
/// The first change only seeds the previous state; counting starts at the
/// second change, so `n` changes produce `n - 1` counted transitions.
pub fn count_transitions(diffs: &[f64], threshold: f64) -> Array2<u64> {
    let mut counts = Array2::<u64>::zeros((NUM_STATES, NUM_STATES));
    let Some((&first, rest)) = diffs.split_first() else {
        return counts;
    };

    let mut previous = PriceState::classify(first, threshold);
    for &diff in rest {
        let current = PriceState::classify(diff, threshold);
        counts[[previous.index(), current.index()]] += 1;
        previous = current;
    }

    counts
}

pub fn normalize_counts(counts: &Array2<u64>, policy: ZeroRowPolicy) -> Result<Array2<f64>> {
    let mut transitions = Array2::<f64>::zeros((NUM_STATES, NUM_STATES));

    for (i, row) in counts.rows().into_iter().enumerate() {
        let total: u64 = row.sum();
        if total > 0 {
            for (j, &count) in row.iter().enumerate() {
                transitions[[i, j]] = count as f64 / total as f64;
            }
            continue;
        }

        let state = PriceState::from_index(i).unwrap_or(PriceState::NoChange);
        debug!("No transitions observed out of {}, applying {:?}", state, policy);
        match policy {
            ZeroRowPolicy::Uniform => transitions.row_mut(i).fill(1.0 / NUM_STATES as f64),
            ZeroRowPolicy::SelfLoop => transitions[[i, i]] = 1.0,
            ZeroRowPolicy::Reject => {
                return Err(MarkovError::InsufficientData(format!(
                    "no transitions observed out of state {}",
                    state
                )));
            }
        }
    }

    Ok(transitions)
}
