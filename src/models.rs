//! Data models for the air quality windowing pipeline.
//!
//! Readings flow leaf-first through these types:
//! `RawReading` → `PollutantSeries` → `WideTable` → `WindowBlock` / `SupervisedPair`.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::PipelineError;

// ---

/// Species tracked by default, in extraction order.
pub const DEFAULT_SPECIES: [&str; 4] = ["CO", "NO", "PM10", "PM2.5"];

/// Column order the downstream scorer expects.
pub const DEFAULT_FORECAST_ORDER: [&str; 4] = ["NO", "PM10", "PM2.5", "CO"];

/// Central London monitoring sites fetched in forecast mode.
pub const DEFAULT_SITE_IDS: [&str; 10] = [
    "BL0", "CT3", "HG1", "IS2", "KC1", "LB4", "SK8", "TH4", "WA9", "WM0",
];

/// Width of one resampling bucket, in minutes.
pub const BUCKET_MINUTES: i64 = 30;

/// One row of a raw per-site file.
///
/// `units` and `ratified` are carried by the source format but never used by
/// the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReading {
    // ---
    pub site_id: String,
    pub species: String,
    pub timestamp: NaiveDateTime,
    pub value: Option<f64>,
    pub ratified: String,
}

/// A single (timestamp, value) observation of one species.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: NaiveDateTime,
    pub value: f64,
}

/// Ordered observations of one species with every value filled.
#[derive(Debug, Clone, PartialEq)]
pub struct PollutantSeries {
    // ---
    pub species: String,
    pub points: Vec<SeriesPoint>,
}

impl PollutantSeries {
    pub fn new(species: impl Into<String>, points: Vec<SeriesPoint>) -> Self {
        Self {
            species: species.into(),
            points,
        }
    }
}

/// Timestamp-keyed table with one column per species.
///
/// Rows are kept in a `BTreeMap`, so iteration is always chronological. A cell
/// is `None` only when a re-observed species contributed a timestamp the other
/// columns never saw.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WideTable {
    columns: Vec<String>,
    rows: BTreeMap<NaiveDateTime, Vec<Option<f64>>>,
}

impl WideTable {
    // ---
    /// Build a one-column table from a resampled series.
    pub fn from_series(series: &PollutantSeries) -> Self {
        let rows = series
            .points
            .iter()
            .map(|p| (p.timestamp, vec![Some(p.value)]))
            .collect();

        Self {
            columns: vec![series.species.clone()],
            rows,
        }
    }

    pub(crate) fn from_parts(
        columns: Vec<String>,
        rows: BTreeMap<NaiveDateTime, Vec<Option<f64>>>,
    ) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, species: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == species)
    }

    pub fn has_column(&self, species: &str) -> bool {
        self.column_index(species).is_some()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> Vec<NaiveDateTime> {
        self.rows.keys().copied().collect()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.keys().next().copied()
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.keys().next_back().copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = (&NaiveDateTime, &Vec<Option<f64>>)> {
        self.rows.iter()
    }

    /// Value of `species` at `timestamp`, if both exist and the cell is filled.
    pub fn get(&self, timestamp: NaiveDateTime, species: &str) -> Option<f64> {
        let idx = self.column_index(species)?;
        self.rows.get(&timestamp).and_then(|row| row[idx])
    }

    /// All cells of one column in chronological order.
    pub fn column(&self, species: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(species)?;
        Some(self.rows.values().map(|row| row[idx]).collect())
    }

    /// Dense row-major values for windowing. Empty cells become `NaN`.
    pub fn values(&self) -> Vec<Vec<f64>> {
        self.rows
            .values()
            .map(|row| row.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
            .collect()
    }

    /// Project the table onto `order`, in that column order.
    pub fn select(&self, order: &[String]) -> Result<WideTable, PipelineError> {
        // ---
        let indices = order
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| PipelineError::UnknownColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|(ts, row)| (*ts, indices.iter().map(|&i| row[i]).collect()))
            .collect();

        Ok(WideTable {
            columns: order.to_vec(),
            rows,
        })
    }
}

/// One row of the dense table handed to the windower.
pub type Row = Vec<f64>;

/// `lag` consecutive Wide Table rows; the unit of partitioning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowBlock {
    pub rows: Vec<Row>,
}

impl WindowBlock {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of species per row; zero for an empty block.
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

/// An input window and the row the model should learn to predict from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisedPair {
    pub input: Vec<Row>,
    pub target: Row,
}

/// Shape of a block sequence as `(blocks, lag, species)`.
pub fn block_shape(blocks: &[WindowBlock]) -> (usize, usize, usize) {
    let lag = blocks.first().map_or(0, WindowBlock::len);
    let width = blocks.first().map_or(0, WindowBlock::width);
    (blocks.len(), lag, width)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn sample_table() -> WideTable {
        let mut rows = BTreeMap::new();
        rows.insert(at(0, 30), vec![Some(2.0), None]);
        rows.insert(at(0, 0), vec![Some(1.0), Some(10.0)]);
        WideTable::from_parts(vec!["CO".into(), "NO".into()], rows)
    }

    #[test]
    fn test_rows_are_chronological() {
        // ---
        let table = sample_table();
        assert_eq!(table.timestamps(), vec![at(0, 0), at(0, 30)]);
        assert_eq!(table.first_timestamp(), Some(at(0, 0)));
        assert_eq!(table.last_timestamp(), Some(at(0, 30)));
    }

    #[test]
    fn test_values_marks_empty_cells_nan() {
        // ---
        let values = sample_table().values();
        assert_eq!(values[0], vec![1.0, 10.0]);
        assert_eq!(values[1][0], 2.0);
        assert!(values[1][1].is_nan());
    }

    #[test]
    fn test_select_reorders_columns() {
        // ---
        let table = sample_table();
        let reordered = table.select(&["NO".to_string(), "CO".to_string()]).unwrap();

        assert_eq!(reordered.columns(), &["NO".to_string(), "CO".to_string()]);
        assert_eq!(reordered.get(at(0, 0), "NO"), Some(10.0));
        assert_eq!(reordered.values()[0], vec![10.0, 1.0]);
    }

    #[test]
    fn test_select_unknown_column_fails() {
        // ---
        let err = sample_table().select(&["SO2".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownColumn(ref c) if c == "SO2"));
    }

    #[test]
    fn test_block_shape() {
        // ---
        let blocks = vec![
            WindowBlock {
                rows: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
            };
            3
        ];
        assert_eq!(block_shape(&blocks), (3, 2, 3));
        assert_eq!(block_shape(&[]), (0, 0, 0));
    }
}
