use ndarray::{Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{MarkovError, Result};
use crate::types::{FittedModel, PriceState, SimulationPath, SimulationRun, NUM_STATES};

/// Simulation engine over one fitted chain.
///
/// The model is read-only, so a single chain can serve any number of
/// concurrent simulations or queries.
#[derive(Debug, Clone)]
pub struct MarkovChain {
    model: FittedModel,
    parallel: bool,
}

impl MarkovChain {
    pub fn new(model: FittedModel) -> Self {
        Self {
            model,
            parallel: true,
        }
    }

    /// Generate batch paths on the rayon pool (default) or sequentially.
    /// Output for a given generator is identical either way.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Random walk of `num_days` prices starting from `starting_price`.
    ///
    /// A large-down step can remove up to twice the average change, so prices
    /// stay positive only while the model's average change is below 50%.
    pub fn simulate_path<R: Rng>(
        &self,
        num_days: usize,
        starting_price: f64,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        validate_walk(num_days, starting_price)?;

        let average_change = self.model.average_change();
        let mut prices = Vec::with_capacity(num_days);

        // The first day's state is drawn uniformly, not from the chain.
        let mut state = PriceState::ALL[rng.gen_range(0..NUM_STATES)];
        let mut price = apply_step(starting_price, state, average_change, rng);
        prices.push(price);

        for _ in 1..num_days {
            state = select_next_state(self.model.row(state), rng);
            price = apply_step(price, state, average_change, rng);
            prices.push(price);
        }

        Ok(prices)
    }

    /// `num_sims` independent paths numbered `1..=num_sims`.
    ///
    /// One seed per path is drawn from `rng` up front, in path order, and
    /// each path runs on its own `StdRng`.
    pub fn run_simulations<R: Rng>(
        &self,
        num_sims: usize,
        num_days: usize,
        starting_price: f64,
        rng: &mut R,
    ) -> Result<SimulationRun> {
        if num_sims == 0 {
            return Err(MarkovError::invalid("number of simulations must be at least 1"));
        }
        let iterations = u32::try_from(num_sims)
            .map_err(|_| MarkovError::invalid(format!("too many simulations: {}", num_sims)))?;
        validate_walk(num_days, starting_price)?;

        let seeds: Vec<(u32, u64)> = (1..=iterations).map(|i| (i, rng.gen())).collect();
        let generate = |&(iteration, seed): &(u32, u64)| -> Result<SimulationPath> {
            let mut path_rng = StdRng::seed_from_u64(seed);
            Ok(SimulationPath {
                iteration,
                prices: self.simulate_path(num_days, starting_price, &mut path_rng)?,
            })
        };

        let paths: Vec<SimulationPath> = if self.parallel {
            seeds.par_iter().map(generate).collect::<Result<_>>()?
        } else {
            seeds.iter().map(generate).collect::<Result<_>>()?
        };

        debug!(
            "Generated {} paths of {} days for {}",
            paths.len(),
            num_days,
            self.model.symbol()
        );

        Ok(SimulationRun {
            symbol: self.model.symbol().clone(),
            starting_price,
            num_days,
            paths,
        })
    }

    /// The transition matrix raised to `days_later`, by repeated left-multiplication.
    pub fn n_step_matrix(&self, days_later: i64) -> Result<Array2<f64>> {
        if days_later <= 0 {
            return Err(MarkovError::invalid(format!(
                "days later must be at least 1, got {}",
                days_later
            )));
        }

        let transitions = self.model.transitions();
        let mut result = transitions.clone();
        for _ in 1..days_later {
            result = transitions.dot(&result);
        }
        Ok(result)
    }

    /// P(state after `days_later` steps = `final_state` | now = `initial_state`).
    pub fn predict_x_days(
        &self,
        initial_state: PriceState,
        final_state: PriceState,
        days_later: i64,
    ) -> Result<f64> {
        let result = self.n_step_matrix(days_later)?;
        Ok(result[[initial_state.index(), final_state.index()]])
    }
}

fn validate_walk(num_days: usize, starting_price: f64) -> Result<()> {
    if num_days == 0 {
        return Err(MarkovError::invalid("number of days must be at least 1"));
    }
    if !starting_price.is_finite() || starting_price <= 0.0 {
        return Err(MarkovError::invalid(format!(
            "starting price must be finite and positive, got {}",
            starting_price
        )));
    }
    Ok(())
}

/// Move `price` by a random percentage whose size band is set by `state`.
pub fn apply_step<R: Rng>(
    price: f64,
    state: PriceState,
    average_change: f64,
    rng: &mut R,
) -> f64 {
    let multiplier = match state {
        PriceState::SmallIncrease => rng.gen::<f64>() * average_change,
        PriceState::LargeIncrease => average_change + rng.gen::<f64>() * average_change,
        PriceState::SmallDecrease => -(rng.gen::<f64>() * average_change),
        PriceState::LargeDecrease => -(average_change + rng.gen::<f64>() * average_change),
        PriceState::NoChange => 0.0,
    };
    price * (1.0 + multiplier / 100.0)
}

/// Roulette-wheel draw from one transition row.
pub fn select_next_state<R: Rng>(row: ArrayView1<'_, f64>, rng: &mut R) -> PriceState {
    // u in (0, 1] so a zero-probability state can never satisfy cumulative >= u
    let u = 1.0 - rng.gen::<f64>();
    let mut cumulative = 0.0;
    for (i, p) in row.iter().enumerate() {
        cumulative += p;
        if cumulative >= u {
            return PriceState::ALL[i];
        }
    }

    // Rounding left the row total just below u.
    row.iter()
        .rposition(|&p| p > 0.0)
        .and_then(PriceState::from_index)
        .unwrap_or(PriceState::NoChange)
}
