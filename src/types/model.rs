use ndarray::{Array2, ArrayView1};

use super::{PriceState, Symbol, NUM_STATES};
use crate::error::{MarkovError, Result};

/// Tolerance used when checking that a transition row is a distribution.
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

/// Fitted 5-state chain for one symbol. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    symbol: Symbol,
    /// Mean absolute day-over-day percentage change of the sample.
    /// Doubles as classification threshold and step magnitude.
    average_change: f64,
    /// `transitions[[i, j]]` = P(next = j | current = i)
    transitions: Array2<f64>,
}

impl FittedModel {
    pub fn new(symbol: Symbol, average_change: f64, transitions: Array2<f64>) -> Result<Self> {
        if !average_change.is_finite() || average_change < 0.0 {
            return Err(MarkovError::invalid(format!(
                "average change must be finite and non-negative, got {}",
                average_change
            )));
        }
        if transitions.shape() != &[NUM_STATES, NUM_STATES] {
            return Err(MarkovError::invalid(format!(
                "transition matrix must be {}x{}, got {:?}",
                NUM_STATES,
                NUM_STATES,
                transitions.shape()
            )));
        }
        if let Some(bad) = transitions.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(MarkovError::invalid(format!(
                "transition probabilities must be finite and non-negative, got {}",
                bad
            )));
        }

        let model = Self {
            symbol,
            average_change,
            transitions,
        };
        if !model.is_row_stochastic() {
            let sums: Vec<f64> = model.transitions.rows().into_iter().map(|r| r.sum()).collect();
            return Err(MarkovError::invalid(format!(
                "every transition row must sum to 1, got row sums {:?}",
                sums
            )));
        }
        Ok(model)
    }

    /// Build from the row-major flattening used by the model file.
    pub fn from_flat(symbol: Symbol, average_change: f64, flat: Vec<f64>) -> Result<Self> {
        let transitions = Array2::from_shape_vec((NUM_STATES, NUM_STATES), flat)
            .map_err(|e| MarkovError::invalid(format!("bad transition matrix: {}", e)))?;
        Self::new(symbol, average_change, transitions)
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn average_change(&self) -> f64 {
        self.average_change
    }

    pub fn transitions(&self) -> &Array2<f64> {
        &self.transitions
    }

    pub fn row(&self, state: PriceState) -> ArrayView1<'_, f64> {
        self.transitions.row(state.index())
    }

    pub fn probability(&self, from: PriceState, to: PriceState) -> f64 {
        self.transitions[[from.index(), to.index()]]
    }

    pub fn is_row_stochastic(&self) -> bool {
        self.transitions
            .rows()
            .into_iter()
            .all(|row| (row.sum() - 1.0).abs() <= ROW_SUM_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym() -> Symbol {
        Symbol::parse("TEST").unwrap()
    }

    #[test]
    fn test_rejects_wrong_shape() {
        let err = FittedModel::new(sym(), 1.0, Array2::zeros((4, 5))).unwrap_err();
        assert!(matches!(err, MarkovError::InvalidArgument(_)));
        assert!(FittedModel::from_flat(sym(), 1.0, vec![0.2; 24]).is_err());
    }

    #[test]
    fn test_rejects_negative_values() {
        assert!(FittedModel::new(sym(), -0.1, Array2::from_elem((5, 5), 0.2)).is_err());
        let mut t = Array2::from_elem((5, 5), 0.2);
        t[[2, 3]] = -0.2;
        assert!(FittedModel::new(sym(), 1.0, t).is_err());
    }

    #[test]
    fn test_rows_must_sum_to_one() {
        let model = FittedModel::new(sym(), 1.0, Array2::from_elem((5, 5), 0.2)).unwrap();
        assert!(model.is_row_stochastic());

        let err = FittedModel::new(sym(), 1.0, Array2::from_elem((5, 5), 0.1)).unwrap_err();
        assert!(matches!(err, MarkovError::InvalidArgument(_)));

        let mut t = Array2::from_elem((5, 5), 0.2);
        t[[3, 0]] = 0.2 + 1e-6;
        assert!(FittedModel::new(sym(), 1.0, t).is_err());

        // summation noise within tolerance is accepted
        let mut t = Array2::from_elem((5, 5), 0.2);
        t[[1, 4]] = 0.2 + 1e-12;
        assert!(FittedModel::new(sym(), 1.0, t).is_ok());
    }

    #[test]
    fn test_from_flat_is_row_major() {
        let mut flat = vec![0.0; 25];
        flat[5] = 1.0; // large increase -> small increase
        flat[0] = 1.0;
        flat[12] = 1.0;
        flat[18] = 1.0;
        flat[24] = 1.0;
        let model = FittedModel::from_flat(sym(), 1.0, flat).unwrap();
        assert_eq!(model.probability(PriceState::LargeIncrease, PriceState::SmallIncrease), 1.0);
        assert_eq!(model.probability(PriceState::LargeIncrease, PriceState::LargeIncrease), 0.0);
        assert_eq!(model.probability(PriceState::NoChange, PriceState::NoChange), 1.0);
    }
}
