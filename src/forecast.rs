//! Forecast and training drivers sitting on top of the pipeline.
//!
//! The scorer is external; this module only prepares its input in the column
//! order it expects and renders what it returns.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::PipelineError;
use crate::models::{block_shape, WideTable, WindowBlock, BUCKET_MINUTES};
use crate::pipeline::{forecast_block, split_partitions, to_supervised, DatasetAssembler, SplitPolicy};

// ---

/// Output format of the forecast period label.
pub const FORECAST_PERIOD_FORMAT: &str = "%d-%b-%Y %H:%M:%S";

/// Named mapping from wide table columns to scorer input positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    order: Vec<String>,
}

impl ColumnMapping {
    pub fn new(order: Vec<String>) -> Self {
        Self { order }
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Reorder `table` to scorer order. Fails if a mapped column is missing.
    pub fn apply(&self, table: &WideTable) -> Result<WideTable, PipelineError> {
        table.select(&self.order)
    }
}

/// Black-box model consuming one forecast block.
///
/// Returns one predicted value per column of the block, in the same order.
pub trait Scorer {
    fn predict(&self, block: &WindowBlock) -> Result<Vec<f64>>;
}

/// Everything the external scorer needs for one forward prediction.
#[derive(Debug, Clone, Serialize)]
pub struct ForecastRequest {
    pub run_id: Uuid,
    pub period: String,
    pub columns: Vec<String>,
    /// `[1, lag, columns]`
    pub shape: [usize; 3],
    pub block: WindowBlock,
}

/// A scored forecast, keyed by the mapped column order.
#[derive(Debug, Clone, Serialize)]
pub struct Forecast {
    pub period: String,
    pub values: Vec<(String, f64)>,
}

impl Forecast {
    pub fn value(&self, species: &str) -> Option<f64> {
        self.values.iter().find(|(s, _)| s == species).map(|(_, v)| *v)
    }

    /// Human readable summary, e.g. `CO:0.2, NO:1.5 and PM10:20 forecast ...`.
    pub fn describe(&self) -> String {
        // ---
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|(s, v)| format!("{}:{}", s, v))
            .collect();

        let joined = match parts.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} and {}", rest.join(", "), last),
            Some((last, _)) => last.clone(),
            None => String::new(),
        };
        format!("{} forecast for next {} minutes: {}", joined, BUCKET_MINUTES, self.period)
    }
}

/// Label for the bucket after the table's last row.
pub fn forecast_period(table: &WideTable) -> Option<NaiveDateTime> {
    table
        .last_timestamp()
        .map(|ts| ts + Duration::minutes(BUCKET_MINUTES))
}

/// Reorder `table` and cut the most recent block for the scorer.
pub fn prepare_forecast(
    run_id: Uuid,
    table: &WideTable,
    mapping: &ColumnMapping,
    lag: usize,
) -> Result<ForecastRequest> {
    // ---
    let ordered = mapping.apply(table)?;
    let period = forecast_period(&ordered).ok_or(PipelineError::EmptyDataset)?;
    let block = forecast_block(&ordered.values(), lag)?;

    Ok(ForecastRequest {
        run_id,
        period: period.format(FORECAST_PERIOD_FORMAT).to_string(),
        columns: mapping.order().to_vec(),
        shape: [1, block.len(), block.width()],
        block,
    })
}

/// Run the scorer on a prepared request.
pub fn score(request: &ForecastRequest, scorer: &dyn Scorer) -> Result<Forecast> {
    // ---
    let prediction = scorer.predict(&request.block)?;
    if prediction.len() != request.columns.len() {
        bail!(
            "Scorer returned {} values for {} columns",
            prediction.len(),
            request.columns.len()
        );
    }

    Ok(Forecast {
        period: request.period.clone(),
        values: request.columns.iter().cloned().zip(prediction).collect(),
    })
}

/// Shapes of a prepared training dataset.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub columns: Vec<String>,
    pub rows: usize,
    pub first_timestamp: Option<NaiveDateTime>,
    pub last_timestamp: Option<NaiveDateTime>,
    pub train_shape: (usize, usize, usize),
    pub test_shape: (usize, usize, usize),
    pub validate_shape: (usize, usize, usize),
    pub supervised_pairs: usize,
}

/// Assemble the training directory, split it and build supervised pairs.
pub fn prepare_training(cfg: &Config) -> Result<DatasetSummary> {
    // ---
    let table = assemble(cfg, &cfg.data_dir)?;
    let policy = SplitPolicy {
        test_rows: cfg.test_rows,
        validate_rows: cfg.validate_rows,
        lag: cfg.lag,
    };

    let parts = split_partitions(&table.values(), policy)?;
    let pairs = to_supervised(&parts.train, cfg.n_input, cfg.n_out);
    info!("Built {} supervised training pairs", pairs.len());

    Ok(DatasetSummary {
        columns: table.columns().to_vec(),
        rows: table.len(),
        first_timestamp: table.first_timestamp(),
        last_timestamp: table.last_timestamp(),
        train_shape: block_shape(&parts.train),
        test_shape: block_shape(&parts.test),
        validate_shape: block_shape(&parts.validate),
        supervised_pairs: pairs.len(),
    })
}

/// Assemble `dir` into a wide table with the configured species.
pub fn assemble(cfg: &Config, dir: &Path) -> Result<WideTable> {
    DatasetAssembler::new(cfg.tracked_species.clone())
        .assemble_dir(dir)
        .with_context(|| format!("Failed to assemble dataset from {}", dir.display()))
}
