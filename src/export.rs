use std::path::{Path, PathBuf};

use csv::{QuoteStyle, WriterBuilder};
use tracing::info;

use crate::error::{MarkovError, Result};
use crate::types::{SimulationRun, Symbol};

/// Writes stored runs as tab-delimited tables under a results directory.
#[derive(Debug, Clone)]
pub struct SimulationExporter {
    results_dir: PathBuf,
}

impl SimulationExporter {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// `table<SYM>.csv` the first time, then `table<SYM><k>.csv` where `k`
    /// counts the files already present for the symbol.
    pub fn next_path(&self, symbol: &Symbol) -> Result<PathBuf> {
        let prefix = format!("table{}", symbol.as_str());
        let first = self.results_dir.join(format!("{}.csv", prefix));
        if !first.exists() {
            return Ok(first);
        }

        let mut existing = 0usize;
        for entry in std::fs::read_dir(&self.results_dir)? {
            if entry?.file_name().to_string_lossy().starts_with(&prefix) {
                existing += 1;
            }
        }

        // Another symbol can share the prefix (SPY vs SPYG); skip taken names.
        let mut k = existing;
        loop {
            let candidate = self.results_dir.join(format!("{}{}.csv", prefix, k));
            if !candidate.exists() {
                return Ok(candidate);
            }
            k += 1;
        }
    }

    pub fn export(&self, run: &SimulationRun) -> Result<PathBuf> {
        if run.is_empty() {
            return Err(MarkovError::NoSimulations(run.symbol.to_string()));
        }

        std::fs::create_dir_all(&self.results_dir)?;
        let path = self.next_path(&run.symbol)?;
        write_table(&path, run)?;

        info!(
            "Exported {} simulations for {} to {}",
            run.num_sims(),
            run.symbol,
            path.display()
        );
        Ok(path)
    }
}

fn write_table(path: &Path, run: &SimulationRun) -> Result<()> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Never)
        .from_path(path)?;

    let mut header = Vec::with_capacity(run.num_days + 1);
    header.push("ITERATION".to_string());
    header.extend((1..=run.num_days).map(|d| format!("DAY{}", d)));
    writer.write_record(&header)?;

    for sim in &run.paths {
        let mut row = Vec::with_capacity(sim.prices.len() + 1);
        row.push(sim.iteration.to_string());
        row.extend(sim.prices.iter().map(|p| p.to_string()));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SimulationPath;

    fn run(symbol: &str) -> SimulationRun {
        SimulationRun {
            symbol: Symbol::parse(symbol).unwrap(),
            starting_price: 10.0,
            num_days: 3,
            paths: vec![
                SimulationPath { iteration: 1, prices: vec![10.5, 11.0, 10.75] },
                SimulationPath { iteration: 2, prices: vec![9.5, 9.0, 9.25] },
            ],
        }
    }

    #[test]
    fn test_export_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SimulationExporter::new(dir.path().join("results"));

        let path = exporter.export(&run("aapl")).unwrap();
        assert_eq!(path.file_name().unwrap(), "tableAAPL.csv");

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "ITERATION\tDAY1\tDAY2\tDAY3");
        assert_eq!(lines[1], "1\t10.5\t11\t10.75");
        assert_eq!(lines[2], "2\t9.5\t9\t9.25");
    }

    #[test]
    fn test_repeated_exports_are_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SimulationExporter::new(dir.path());

        let names: Vec<String> = (0..3)
            .map(|_| {
                exporter
                    .export(&run("MSFT"))
                    .unwrap()
                    .file_name()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["tableMSFT.csv", "tableMSFT1.csv", "tableMSFT2.csv"]);
    }

    #[test]
    fn test_empty_run_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut empty = run("X");
        empty.paths.clear();
        let err = SimulationExporter::new(dir.path()).export(&empty).unwrap_err();
        assert!(matches!(err, MarkovError::NoSimulations(_)));
    }
}
