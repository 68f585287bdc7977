use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::markov::ZeroRowPolicy;
use crate::store::ConflictPolicy;

pub const ENV_PREFIX: &str = "MARKOV";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageSettings,
    pub market: MarketSettings,
    pub simulation: SimulationSettings,
}

impl AppConfig {
    /// Defaults, then the optional TOML file, then `MARKOV__SECTION__KEY` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(false));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: AppConfig = builder.build()?.try_deserialize()?;
        loaded
            .validate()
            .map_err(|errors| anyhow!("invalid configuration: {}", errors.join(", ")))?;
        Ok(loaded)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !self.storage.simulations_db.starts_with("sqlite:") {
            errors.push("storage.simulations_db must be a sqlite: URL".to_string());
        }

        if self.market.provider == ProviderKind::Binance && self.market.base_url.trim().is_empty() {
            errors.push("market.base_url must be set for the binance provider".to_string());
        }
        if self.market.history_days < 2 {
            errors.push("market.history_days must be >= 2".to_string());
        }
        if self.market.request_timeout_secs == 0 {
            errors.push("market.request_timeout_secs must be > 0".to_string());
        }

        if self.simulation.default_sims == 0 {
            errors.push("simulation.default_sims must be > 0".to_string());
        }
        if self.simulation.default_days == 0 {
            errors.push("simulation.default_days must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Tab-delimited model file
    pub models_path: PathBuf,
    pub simulations_db: String,
    pub results_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            models_path: PathBuf::from("matrices.csv"),
            simulations_db: "sqlite:./sims.db".to_string(),
            results_dir: PathBuf::from("./results"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Binance,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub provider: ProviderKind,
    pub base_url: String,
    /// Number of daily candles requested for estimation
    pub history_days: u32,
    pub csv_dir: PathBuf,
    pub request_timeout_secs: u64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Binance,
            base_url: crate::market::binance::BINANCE_US_API.to_string(),
            history_days: 1000,
            csv_dir: PathBuf::from("./data"),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub default_sims: usize,
    pub default_days: usize,
    /// Fixed seed for reproducible runs; entropy when unset
    pub seed: Option<u64>,
    pub zero_row_policy: ZeroRowPolicy,
    pub model_conflict: ConflictPolicy,
    pub parallel: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            default_sims: 100,
            default_days: 30,
            seed: None,
            zero_row_policy: ZeroRowPolicy::Uniform,
            model_conflict: ConflictPolicy::KeepFirst,
            parallel: true,
        }
    }
}
