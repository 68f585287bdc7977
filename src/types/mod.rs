pub mod symbol;
pub mod state;
pub mod model;
pub mod history;
pub mod simulation;

pub use symbol::*;
pub use state::*;
pub use model::*;
pub use history::*;
pub use simulation::*;
