use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{ConflictPolicy, ModelStore};
use crate::error::{MarkovError, Result};
use crate::types::{FittedModel, Symbol, NUM_STATES};

/// symbol, average change, then the 25 matrix entries row by row
const FIELDS_PER_RECORD: usize = 2 + NUM_STATES * NUM_STATES;

/// Tab-delimited, append-only model file. One model per line.
pub struct ModelFile {
    path: PathBuf,
    conflict: ConflictPolicy,
    write_lock: Mutex<()>,
}

impl ModelFile {
    pub fn new(path: impl Into<PathBuf>, conflict: ConflictPolicy) -> Self {
        Self {
            path: path.into(),
            conflict,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(model: &FittedModel) -> Vec<String> {
        let mut fields = Vec::with_capacity(FIELDS_PER_RECORD);
        fields.push(model.symbol().to_string());
        fields.push(model.average_change().to_string());
        fields.extend(model.transitions().iter().map(|p| p.to_string()));
        fields
    }

    fn decode(symbol: &Symbol, record: &StringRecord, line: u64) -> Result<FittedModel> {
        if record.len() != FIELDS_PER_RECORD {
            return Err(MarkovError::Store(format!(
                "model record for {} on line {} has {} fields, expected {}",
                symbol,
                line,
                record.len(),
                FIELDS_PER_RECORD
            )));
        }

        let numbers: std::result::Result<Vec<f64>, _> =
            record.iter().skip(1).map(|f| f.trim().parse::<f64>()).collect();
        let numbers = numbers.map_err(|e| {
            MarkovError::Store(format!("model record for {} on line {}: {}", symbol, line, e))
        })?;

        FittedModel::from_flat(symbol.clone(), numbers[0], numbers[1..].to_vec()).map_err(|e| {
            MarkovError::Store(format!("model record for {} on line {}: {}", symbol, line, e))
        })
    }
}

#[async_trait]
impl ModelStore for ModelFile {
    async fn save(&self, model: &FittedModel) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .quote_style(QuoteStyle::Never)
            .from_writer(file);

        writer.write_record(Self::encode(model))?;
        writer.flush()?;

        info!("Appended model for {} to {}", model.symbol(), self.path.display());
        Ok(())
    }

    async fn load(&self, symbol: &Symbol) -> Result<FittedModel> {
        if !self.path.exists() {
            return Err(MarkovError::ModelNotFound(symbol.to_string()));
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut found = None;
        for record in reader.records() {
            let record = record?;
            let matches = record
                .get(0)
                .map(|s| s.trim().eq_ignore_ascii_case(symbol.as_str()))
                .unwrap_or(false);
            if !matches {
                continue;
            }

            let line = record.position().map(|p| p.line()).unwrap_or(0);
            let model = Self::decode(symbol, &record, line)?;
            debug!("Found model for {} on line {}", symbol, line);
            found = Some(model);
            if self.conflict == ConflictPolicy::KeepFirst {
                break;
            }
        }

        found.ok_or_else(|| MarkovError::ModelNotFound(symbol.to_string()))
    }
}
