use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ConflictPolicy, ModelStore, SimulationStore};
use crate::error::{MarkovError, Result};
use crate::types::{FittedModel, SimulationRun, Symbol};

/// Process-local model store. Keeps every saved record, like the file store.
#[derive(Default)]
pub struct InMemoryModelStore {
    models: RwLock<HashMap<Symbol, Vec<FittedModel>>>,
    conflict: ConflictPolicy,
}

impl InMemoryModelStore {
    pub fn new(conflict: ConflictPolicy) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            conflict,
        }
    }

    pub async fn record_count(&self, symbol: &Symbol) -> usize {
        self.models.read().await.get(symbol).map_or(0, Vec::len)
    }
}

#[async_trait]
impl ModelStore for InMemoryModelStore {
    async fn save(&self, model: &FittedModel) -> Result<()> {
        self.models
            .write()
            .await
            .entry(model.symbol().clone())
            .or_default()
            .push(model.clone());
        Ok(())
    }

    async fn load(&self, symbol: &Symbol) -> Result<FittedModel> {
        let models = self.models.read().await;
        let records = models.get(symbol);
        let chosen = match self.conflict {
            ConflictPolicy::KeepFirst => records.and_then(|r| r.first()),
            ConflictPolicy::KeepLast => records.and_then(|r| r.last()),
        };
        chosen
            .cloned()
            .ok_or_else(|| MarkovError::ModelNotFound(symbol.to_string()))
    }
}

#[derive(Default)]
pub struct InMemorySimulationStore {
    runs: RwLock<HashMap<Symbol, SimulationRun>>,
}

impl InMemorySimulationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SimulationStore for InMemorySimulationStore {
    async fn write_run(&self, run: &SimulationRun) -> Result<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&run.symbol) {
            return Err(MarkovError::Store(format!(
                "simulations for {} already stored; erase them first",
                run.symbol
            )));
        }
        runs.insert(run.symbol.clone(), run.clone());
        Ok(())
    }

    async fn read_run(&self, symbol: &Symbol) -> Result<Option<SimulationRun>> {
        Ok(self.runs.read().await.get(symbol).cloned())
    }

    async fn erase(&self, symbol: &Symbol) -> Result<()> {
        self.runs.write().await.remove(symbol);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn model(average_change: f64) -> FittedModel {
        FittedModel::new(
            Symbol::parse("TSLA").unwrap(),
            average_change,
            Array2::from_elem((5, 5), 0.2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_model_conflict_policy() {
        let first = InMemoryModelStore::new(ConflictPolicy::KeepFirst);
        let last = InMemoryModelStore::new(ConflictPolicy::KeepLast);
        for store in [&first, &last] {
            store.save(&model(1.0)).await.unwrap();
            store.save(&model(2.0)).await.unwrap();
        }

        let tsla = Symbol::parse("TSLA").unwrap();
        assert_eq!(first.record_count(&tsla).await, 2);
        assert_eq!(first.load(&tsla).await.unwrap().average_change(), 1.0);
        assert_eq!(last.load(&tsla).await.unwrap().average_change(), 2.0);
    }

    #[tokio::test]
    async fn test_missing_model() {
        let store = InMemoryModelStore::default();
        let err = store.load(&Symbol::parse("NOPE").unwrap()).await.unwrap_err();
        assert!(matches!(err, MarkovError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_simulation_store_erase_and_rewrite() {
        let store = InMemorySimulationStore::new();
        let symbol = Symbol::parse("TSLA").unwrap();
        store.erase(&symbol).await.unwrap();

        let run = SimulationRun {
            symbol: symbol.clone(),
            starting_price: 10.0,
            num_days: 1,
            paths: Vec::new(),
        };
        store.write_run(&run).await.unwrap();
        assert!(store.write_run(&run).await.is_err());

        store.erase(&symbol).await.unwrap();
        assert!(store.read_run(&symbol).await.unwrap().is_none());
        store.write_run(&run).await.unwrap();
    }
}
