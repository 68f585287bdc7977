mod config;
mod error;
mod export;
mod market;
mod markov;
mod service;
mod store;
mod types;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{AppConfig, ProviderKind};
use crate::error::MarkovError;
use crate::export::SimulationExporter;
use crate::market::{BinanceClient, CsvPriceFiles, MarketDataProvider};
use crate::markov::ModelEstimator;
use crate::service::{MarkovService, SimulationRequest};
use crate::store::{ModelFile, SimulationDatabase};
use crate::types::{FittedModel, PriceState, SimulationRun, Symbol};

#[derive(Parser)]
#[command(name = "markov-stock")]
#[command(version = "0.1.0")]
#[command(about = "Five-state Markov chain price simulator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "markov.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a transition model from daily history and append it to the model file
    Estimate { symbol: Symbol },
    /// Print the stored model for a symbol
    Show { symbol: Symbol },
    /// Run Monte Carlo paths, replacing any stored run for the symbol
    Simulate {
        symbol: Symbol,
        /// Number of paths
        #[arg(short = 'n', long)]
        sims: Option<usize>,
        /// Days per path
        #[arg(short, long)]
        days: Option<usize>,
        /// Starting price; the live quote when omitted
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Probability of moving from one state to another after N days
    Predict {
        symbol: Symbol,
        /// Index (0-4) or name, e.g. small_increase
        #[arg(long)]
        from: PriceState,
        #[arg(long)]
        to: PriceState,
        #[arg(long)]
        days: i64,
    },
    /// Summarize the stored simulation run
    List { symbol: Symbol },
    /// Write the stored run to a numbered table in the results directory
    Export { symbol: Symbol },
    /// Delete the stored run for a symbol
    Erase { symbol: Symbol },
    /// Write the default configuration as TOML
    InitConfig { path: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install logger: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            let code = e
                .downcast_ref::<MarkovError>()
                .map(MarkovError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    if let Commands::InitConfig { path } = &cli.command {
        let path = path.clone().unwrap_or_else(|| cli.config.clone());
        std::fs::write(&path, AppConfig::default().to_toml()?)?;
        info!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = AppConfig::load(Some(&cli.config))?;
    let service = build_service(&config).await?;

    match cli.command {
        Commands::Estimate { symbol } => {
            let model = service.estimate(&symbol).await?;
            print_model(&model);
        }
        Commands::Show { symbol } => {
            let model = service.load_model(&symbol).await?;
            print_model(&model);
        }
        Commands::Simulate { symbol, sims, days, price, seed } => {
            let request = SimulationRequest {
                num_sims: sims.unwrap_or(config.simulation.default_sims),
                num_days: days.unwrap_or(config.simulation.default_days),
                starting_price: price,
                seed: seed.or(config.simulation.seed),
            };
            let run = service.simulate(&symbol, request).await?;
            print_summary(&run);
        }
        Commands::Predict { symbol, from, to, days } => {
            let p = service.predict(&symbol, from, to, days).await?;
            println!("P({} -> {} in {} days) = {:.6}", from, to, days, p);
        }
        Commands::List { symbol } => {
            let run = service.read_simulations(&symbol).await?;
            print_summary(&run);
        }
        Commands::Export { symbol } => {
            let path = service.export(&symbol).await?;
            println!("{}", path.display());
        }
        Commands::Erase { symbol } => {
            service.erase(&symbol).await?;
        }
        Commands::InitConfig { .. } => unreachable!("handled before loading configuration"),
    }

    Ok(())
}

async fn build_service(config: &AppConfig) -> Result<MarkovService> {
    let market: Arc<dyn MarketDataProvider> = match config.market.provider {
        ProviderKind::Binance => Arc::new(BinanceClient::new(
            config.market.base_url.clone(),
            config.market.history_days,
            Duration::from_secs(config.market.request_timeout_secs),
        )?),
        ProviderKind::Csv => Arc::new(CsvPriceFiles::new(config.market.csv_dir.clone())),
    };

    let models = Arc::new(ModelFile::new(
        config.storage.models_path.clone(),
        config.simulation.model_conflict,
    ));
    info!("Using model file {}", models.path().display());
    let simulations = Arc::new(SimulationDatabase::new(&config.storage.simulations_db).await?);

    Ok(MarkovService::new(
        market,
        models,
        simulations,
        ModelEstimator::new(config.simulation.zero_row_policy),
        SimulationExporter::new(config.storage.results_dir.clone()),
    )
    .with_parallel(config.simulation.parallel))
}

fn print_model(model: &FittedModel) {
    println!("{}  average change {:.4}%", model.symbol(), model.average_change());
    print!("{:>16}", "");
    for state in PriceState::ALL {
        print!("{:>16}", state.as_str());
    }
    println!();
    for from in PriceState::ALL {
        print!("{:>16}", from.as_str());
        for to in PriceState::ALL {
            print!("{:>16.6}", model.probability(from, to));
        }
        println!();
    }
}

fn print_summary(run: &SimulationRun) {
    println!(
        "{}: {} paths x {} days from {:.4}",
        run.symbol,
        run.num_sims(),
        run.num_days,
        run.starting_price
    );
    if let Some(summary) = run.terminal_summary() {
        println!(
            "terminal min {:.4}  mean {:.4}  max {:.4}  up {:.1}%",
            summary.min,
            summary.mean,
            summary.max,
            summary.up_fraction * 100.0
        );
    }
}
