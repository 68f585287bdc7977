use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::info;

use super::SimulationStore;
use crate::error::{MarkovError, Result};
use crate::types::{SimulationPath, SimulationRun, Symbol};

/// SQLite-backed simulation store: one run header per symbol plus one row
/// per `(symbol, iteration, day)` price.
pub struct SimulationDatabase {
    pool: SqlitePool,
}

impl SimulationDatabase {
    /// Open (creating if missing) a database from a `sqlite:` URL.
    pub async fn new(db_url: &str) -> Result<Self> {
        info!("Initializing simulation database at: {}", db_url);
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        Self::connect(options).await
    }

    #[cfg(test)]
    pub async fn open_path(path: &std::path::Path) -> Result<Self> {
        info!("Initializing simulation database at: {}", path.display());
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS simulation_runs (
                symbol TEXT PRIMARY KEY,
                starting_price REAL NOT NULL,
                num_days INTEGER NOT NULL,
                num_sims INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS simulation_prices (
                symbol TEXT NOT NULL,
                iteration INTEGER NOT NULL,
                day INTEGER NOT NULL,
                price REAL NOT NULL,
                PRIMARY KEY (symbol, iteration, day)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

async fn insert_run(conn: &mut SqliteConnection, run: &SimulationRun) -> Result<()> {
    let symbol = run.symbol.as_str();
    sqlx::query(
        r#"
        INSERT INTO simulation_runs (symbol, starting_price, num_days, num_sims, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(symbol)
    .bind(run.starting_price)
    .bind(run.num_days as i64)
    .bind(run.paths.len() as i64)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    for path in &run.paths {
        for (day, price) in path.prices.iter().enumerate() {
            sqlx::query(
                "INSERT INTO simulation_prices (symbol, iteration, day, price) VALUES (?, ?, ?, ?)",
            )
            .bind(symbol)
            .bind(path.iteration as i64)
            .bind(day as i64 + 1)
            .bind(*price)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

/// Returns the number of price rows removed.
async fn delete_run(conn: &mut SqliteConnection, symbol: &str) -> Result<u64> {
    let removed = sqlx::query("DELETE FROM simulation_prices WHERE symbol = ?")
        .bind(symbol)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    sqlx::query("DELETE FROM simulation_runs WHERE symbol = ?")
        .bind(symbol)
        .execute(&mut *conn)
        .await?;
    Ok(removed)
}

#[async_trait]
impl SimulationStore for SimulationDatabase {
    async fn write_run(&self, run: &SimulationRun) -> Result<()> {
        let symbol = run.symbol.as_str();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT 1 FROM simulation_runs WHERE symbol = ?")
            .bind(symbol)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(MarkovError::Store(format!(
                "simulations for {} already stored; erase them first",
                symbol
            )));
        }

        insert_run(&mut tx, run).await?;
        tx.commit().await?;

        info!(
            "Stored {} simulations x {} days for {}",
            run.paths.len(),
            run.num_days,
            symbol
        );
        Ok(())
    }

    /// Delete and insert in one transaction; the old run survives a failed insert.
    async fn replace_run(&self, run: &SimulationRun) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let removed = delete_run(&mut tx, run.symbol.as_str()).await?;
        insert_run(&mut tx, run).await?;
        tx.commit().await?;

        if removed > 0 {
            sqlx::query("VACUUM").execute(&self.pool).await?;
        }
        info!(
            "Replaced simulations for {} with {} x {} days",
            run.symbol,
            run.paths.len(),
            run.num_days
        );
        Ok(())
    }

    async fn read_run(&self, symbol: &Symbol) -> Result<Option<SimulationRun>> {
        let header = sqlx::query(
            "SELECT starting_price, num_days FROM simulation_runs WHERE symbol = ?",
        )
        .bind(symbol.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };
        let starting_price: f64 = header.get("starting_price");
        let num_days: i64 = header.get("num_days");

        let rows = sqlx::query(
            r#"
            SELECT iteration, day, price
            FROM simulation_prices
            WHERE symbol = ?
            ORDER BY iteration ASC, day ASC
            "#,
        )
        .bind(symbol.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut paths: Vec<SimulationPath> = Vec::new();
        for row in rows {
            let iteration = row.get::<i64, _>("iteration") as u32;
            let price: f64 = row.get("price");
            match paths.last_mut() {
                Some(path) if path.iteration == iteration => path.prices.push(price),
                _ => paths.push(SimulationPath {
                    iteration,
                    prices: vec![price],
                }),
            }
        }

        Ok(Some(SimulationRun {
            symbol: symbol.clone(),
            starting_price,
            num_days: num_days as usize,
            paths,
        }))
    }

    async fn erase(&self, symbol: &Symbol) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let removed = delete_run(&mut tx, symbol.as_str()).await?;
        tx.commit().await?;

        if removed > 0 {
            sqlx::query("VACUUM").execute(&self.pool).await?;
            info!("Erased {} simulated prices for {}", removed, symbol);
        }
        Ok(())
    }
}
