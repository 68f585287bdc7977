use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::error::{MarkovError, Result};
use crate::export::SimulationExporter;
use crate::market::MarketDataProvider;
use crate::markov::{MarkovChain, ModelEstimator};
use crate::store::{ModelStore, SimulationStore};
use crate::types::{FittedModel, PriceState, SimulationRun, Symbol};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationRequest {
    pub num_sims: usize,
    pub num_days: usize,
    /// Live quote from the market provider when `None`
    pub starting_price: Option<f64>,
    /// Entropy-seeded when `None`
    pub seed: Option<u64>,
}

/// The commands a front end can issue: estimate, simulate, query, read,
/// export, and erase.
pub struct MarkovService {
    market: Arc<dyn MarketDataProvider>,
    models: Arc<dyn ModelStore>,
    simulations: Arc<dyn SimulationStore>,
    estimator: ModelEstimator,
    exporter: SimulationExporter,
    parallel: bool,
}

impl MarkovService {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        models: Arc<dyn ModelStore>,
        simulations: Arc<dyn SimulationStore>,
        estimator: ModelEstimator,
        exporter: SimulationExporter,
    ) -> Self {
        Self {
            market,
            models,
            simulations,
            estimator,
            exporter,
            parallel: true,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Fetch the symbol's daily closes, fit a chain, and append it to the model store.
    pub async fn estimate(&self, symbol: &Symbol) -> Result<FittedModel> {
        let history = self.market.daily_history(symbol).await?;
        info!("Estimating {} from {} daily closes", history.symbol, history.len());

        let model = self.estimator.fit(&history.symbol, &history.prices())?;
        self.models.save(&model).await?;
        Ok(model)
    }

    pub async fn load_model(&self, symbol: &Symbol) -> Result<FittedModel> {
        self.models.load(symbol).await
    }

    async fn chain(&self, symbol: &Symbol) -> Result<MarkovChain> {
        let model = self.load_model(symbol).await?;
        Ok(MarkovChain::new(model).with_parallel(self.parallel))
    }

    /// Run a fresh batch, replacing whatever was stored for the symbol.
    pub async fn simulate(&self, symbol: &Symbol, request: SimulationRequest) -> Result<SimulationRun> {
        let chain = self.chain(symbol).await?;

        let starting_price = match request.starting_price {
            Some(price) => price,
            None => self.market.current_price(symbol).await?,
        };

        let mut rng = match request.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let run = chain.run_simulations(request.num_sims, request.num_days, starting_price, &mut rng)?;

        self.simulations.replace_run(&run).await?;

        info!(
            "Simulated {} paths x {} days for {} from {:.4}",
            run.num_sims(),
            run.num_days,
            symbol,
            starting_price
        );
        Ok(run)
    }

    pub async fn predict(
        &self,
        symbol: &Symbol,
        initial_state: PriceState,
        final_state: PriceState,
        days_later: i64,
    ) -> Result<f64> {
        self.chain(symbol)
            .await?
            .predict_x_days(initial_state, final_state, days_later)
    }

    pub async fn read_simulations(&self, symbol: &Symbol) -> Result<SimulationRun> {
        self.simulations
            .read_run(symbol)
            .await?
            .filter(|run| !run.is_empty())
            .ok_or_else(|| MarkovError::NoSimulations(symbol.to_string()))
    }

    pub async fn export(&self, symbol: &Symbol) -> Result<PathBuf> {
        let run = self.read_simulations(symbol).await?;
        self.exporter.export(&run)
    }

    pub async fn erase(&self, symbol: &Symbol) -> Result<()> {
        self.simulations.erase(symbol).await?;
        info!("Erased simulations for {}", symbol);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockMarketDataProvider;
    use crate::store::{ConflictPolicy, InMemoryModelStore, InMemorySimulationStore};
    use crate::types::{DailyClose, PriceHistory};
    use chrono::NaiveDate;

    fn history(symbol: &Symbol, closes: &[f64]) -> PriceHistory {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        PriceHistory::new(
            symbol.clone(),
            closes
                .iter()
                .enumerate()
                .map(|(i, &close)| DailyClose {
                    date: start + chrono::Duration::days(i as i64),
                    close,
                })
                .collect(),
        )
    }

    fn market_with(closes: Vec<f64>, live: f64) -> MockMarketDataProvider {
        let mut market = MockMarketDataProvider::new();
        market
            .expect_daily_history()
            .returning(move |symbol| Ok(history(symbol, &closes)));
        market.expect_current_price().returning(move |_| Ok(live));
        market
    }

    fn service(market: MockMarketDataProvider, results: &std::path::Path) -> MarkovService {
        MarkovService::new(
            Arc::new(market),
            Arc::new(InMemoryModelStore::new(ConflictPolicy::KeepFirst)),
            Arc::new(InMemorySimulationStore::new()),
            ModelEstimator::default(),
            SimulationExporter::new(results),
        )
    }

    fn closes() -> Vec<f64> {
        vec![100.0, 102.0, 101.0, 101.0, 105.0, 104.0, 106.5, 106.0, 103.0, 104.0]
    }

    fn request(seed: Option<u64>) -> SimulationRequest {
        SimulationRequest {
            num_sims: 10,
            num_days: 12,
            starting_price: None,
            seed,
        }
    }

    #[tokio::test]
    async fn test_estimate_persists_model() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(market_with(closes(), 104.0), dir.path());
        let symbol = Symbol::parse("acme").unwrap();

        let fitted = svc.estimate(&symbol).await.unwrap();
        assert_eq!(fitted.symbol().as_str(), "ACME");
        assert!(fitted.is_row_stochastic());
        assert_eq!(svc.load_model(&symbol).await.unwrap(), fitted);
    }

    #[tokio::test]
    async fn test_estimate_with_one_price_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(market_with(vec![100.0], 100.0), dir.path());
        let symbol = Symbol::parse("ONE").unwrap();

        let err = svc.estimate(&symbol).await.unwrap_err();
        assert!(matches!(err, MarkovError::InsufficientData(_)));
        assert!(matches!(svc.load_model(&symbol).await, Err(MarkovError::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_distinct_from_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut market = MockMarketDataProvider::new();
        market
            .expect_daily_history()
            .returning(|symbol| Err(MarkovError::unavailable(symbol.as_str(), "HTTP 503")));
        let svc = service(market, dir.path());

        let err = svc.estimate(&Symbol::parse("DOWN").unwrap()).await.unwrap_err();
        assert!(matches!(err, MarkovError::DataUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_simulate_requires_model_before_quoting() {
        let dir = tempfile::tempdir().unwrap();
        let mut market = MockMarketDataProvider::new();
        market.expect_current_price().never();
        let svc = service(market, dir.path());

        let err = svc
            .simulate(&Symbol::parse("NEW").unwrap(), request(Some(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, MarkovError::ModelNotFound(_)));
    }

    #[tokio::test]
    async fn test_simulate_uses_live_price_and_replaces_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(market_with(closes(), 104.0), dir.path());
        let symbol = Symbol::parse("ACME").unwrap();
        svc.estimate(&symbol).await.unwrap();

        let run = svc.simulate(&symbol, request(Some(5))).await.unwrap();
        assert_eq!(run.starting_price, 104.0);
        assert_eq!(run.num_sims(), 10);
        assert!(run.paths.iter().all(|p| p.prices.len() == 12));

        let second = SimulationRequest {
            num_sims: 3,
            num_days: 4,
            starting_price: Some(50.0),
            seed: Some(6),
        };
        svc.simulate(&symbol, second).await.unwrap();
        let stored = svc.read_simulations(&symbol).await.unwrap();
        assert_eq!(stored.num_sims(), 3);
        assert_eq!(stored.starting_price, 50.0);
    }

    #[tokio::test]
    async fn test_seeded_simulations_are_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(market_with(closes(), 104.0), dir.path());
        let symbol = Symbol::parse("ACME").unwrap();
        svc.estimate(&symbol).await.unwrap();

        let a = svc.simulate(&symbol, request(Some(77))).await.unwrap();
        let b = svc.simulate(&symbol, request(Some(77))).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_predict_matches_model_for_one_day() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(market_with(closes(), 104.0), dir.path());
        let symbol = Symbol::parse("ACME").unwrap();
        let model = svc.estimate(&symbol).await.unwrap();

        let p = svc
            .predict(&symbol, PriceState::LargeIncrease, PriceState::SmallDecrease, 1)
            .await
            .unwrap();
        assert_eq!(p, model.probability(PriceState::LargeIncrease, PriceState::SmallDecrease));

        let err = svc
            .predict(&symbol, PriceState::NoChange, PriceState::NoChange, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, MarkovError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_erase_then_export() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(market_with(closes(), 104.0), dir.path());
        let symbol = Symbol::parse("ACME").unwrap();

        // nothing stored yet
        svc.erase(&symbol).await.unwrap();
        assert!(matches!(svc.export(&symbol).await, Err(MarkovError::NoSimulations(_))));

        svc.estimate(&symbol).await.unwrap();
        svc.simulate(&symbol, request(Some(3))).await.unwrap();
        let path = svc.export(&symbol).await.unwrap();
        assert!(path.exists());

        svc.erase(&symbol).await.unwrap();
        assert!(matches!(
            svc.read_simulations(&symbol).await,
            Err(MarkovError::NoSimulations(_))
        ));
    }
}
