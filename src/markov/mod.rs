pub mod estimator;
pub mod chain;

pub use estimator::{ModelEstimator, ZeroRowPolicy};
pub use chain::MarkovChain;
