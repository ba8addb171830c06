//! Builds the wide table from a directory of raw per-site files.
//!
//! Per file and per tracked species: quality gate → carry-forward imputation
//! → 30-minute bucket averaging → merge.

use std::path::Path;

use chrono::Duration;
use tracing::{debug, info};

use super::impute::{fill_missing, passes_quality_gate};
use super::merge::TableMerger;
use super::resample::resample_mean;
use crate::error::PipelineError;
use crate::models::{PollutantSeries, RawReading, SeriesPoint, WideTable, BUCKET_MINUTES};
use crate::source::{discover_csv_files, read_raw_readings};

// ---

/// Assembles per-site files into one wide table for a fixed species list.
#[derive(Debug, Clone)]
pub struct DatasetAssembler {
    species: Vec<String>,
    bucket: Duration,
}

impl DatasetAssembler {
    pub fn new(species: Vec<String>) -> Self {
        Self {
            species,
            bucket: Duration::minutes(BUCKET_MINUTES),
        }
    }

    /// Read every `*.csv` in `dir` in lexicographic order and merge them.
    pub fn assemble_dir(&self, dir: &Path) -> Result<WideTable, PipelineError> {
        // ---
        let files = discover_csv_files(dir)?;
        info!("Assembling dataset from {} files in {}", files.len(), dir.display());

        let mut merger = TableMerger::new(self.bucket);
        for file in &files {
            let readings = read_raw_readings(file)?;
            self.fold_file(&mut merger, &file.display().to_string(), &readings);
        }

        let table = merger.finish()?;
        info!(
            "Dataset assembled: {} rows x {} columns ({})",
            table.len(),
            table.columns().len(),
            table.columns().join(",")
        );
        Ok(table)
    }

    /// Merge already decoded files; each item is the content of one file.
    pub fn assemble_readings<I>(&self, files: I) -> Result<WideTable, PipelineError>
    where
        I: IntoIterator<Item = Vec<RawReading>>,
    {
        // ---
        let mut merger = TableMerger::new(self.bucket);
        for (i, readings) in files.into_iter().enumerate() {
            self.fold_file(&mut merger, &format!("batch-{}", i), &readings);
        }
        merger.finish()
    }

    fn fold_file(&self, merger: &mut TableMerger, source: &str, readings: &[RawReading]) {
        // ---
        for species in &self.species {
            match self.prepare_species(readings, species) {
                Some(series) => {
                    merger.merge(&series);
                }
                None => debug!(file = source, species = %species, "species rejected by quality gate"),
            }
        }
    }

    /// Extract, gate, impute and resample one species from one file.
    ///
    /// Returns `None` when the species is absent or has at least as many
    /// missing values as present ones.
    pub fn prepare_species(&self, readings: &[RawReading], species: &str) -> Option<PollutantSeries> {
        // ---
        let rows: Vec<&RawReading> = readings.iter().filter(|r| r.species == species).collect();
        let values: Vec<Option<f64>> = rows.iter().map(|r| r.value).collect();

        if !passes_quality_gate(&values) {
            return None;
        }

        let points: Vec<SeriesPoint> = rows
            .iter()
            .zip(fill_missing(&values))
            .map(|(r, value)| SeriesPoint {
                timestamp: r.timestamp,
                value,
            })
            .collect();

        Some(PollutantSeries::new(species, resample_mean(&points, self.bucket)))
    }
}
