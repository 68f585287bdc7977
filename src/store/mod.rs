pub mod matrices;
pub mod database;
#[cfg(test)]
pub mod memory;

pub use matrices::ModelFile;
pub use database::SimulationDatabase;
#[cfg(test)]
pub use memory::{InMemoryModelStore, InMemorySimulationStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{FittedModel, SimulationRun, Symbol};

/// Which record wins when a symbol has been fitted more than once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The earliest record (matches a front-to-back scan of the file)
    #[default]
    KeepFirst,
    /// The most recent record, so re-estimation takes effect
    KeepLast,
}

/// Append-only persistence of fitted models, keyed by symbol.
#[async_trait]
pub trait ModelStore: Send + Sync {
    async fn save(&self, model: &FittedModel) -> Result<()>;

    /// Fails with `ModelNotFound` when the symbol has never been fitted.
    async fn load(&self, symbol: &Symbol) -> Result<FittedModel>;
}

/// Persistence of one simulation run per symbol.
///
/// Writes are whole-batch. Writing while a run already exists for the symbol
/// is a store error; callers erase first or use `replace_run`.
#[async_trait]
pub trait SimulationStore: Send + Sync {
    async fn write_run(&self, run: &SimulationRun) -> Result<()>;

    /// Swap the symbol's stored run for `run`. The default erases then writes,
    /// so a failed write loses the previous run; stores with transactions
    /// override it to keep the old run on failure.
    async fn replace_run(&self, run: &SimulationRun) -> Result<()> {
        self.erase(&run.symbol).await?;
        self.write_run(run).await
    }

    async fn read_run(&self, symbol: &Symbol) -> Result<Option<SimulationRun>>;

    /// Succeeds as a no-op when nothing is stored for the symbol.
    async fn erase(&self, symbol: &Symbol) -> Result<()>;
}
