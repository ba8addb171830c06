//! Incremental fold of per-species series into one wide table.
//!
//! Three cases, decided per incoming series:
//! - no table yet: the series becomes the table;
//! - species already a column: rows are concatenated and re-bucketed, so
//!   overlapping timestamps are averaged;
//! - new species: inner join on timestamp, keeping only shared timestamps.
//!
//! Every cell remembers how many series contributed to it, so a species seen
//! at several sites ends up as the plain mean of all of them whatever order
//! the sites arrive in.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use super::resample::bucket_start;
use crate::error::PipelineError;
use crate::models::{PollutantSeries, WideTable};

// ---

/// Number of series averaged into each cell, parallel to the table rows.
type CellCounts = BTreeMap<NaiveDateTime, Vec<usize>>;

/// Which rule a merge applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    Insert,
    Reaverage,
    Join,
}

/// Owns the wide table while a dataset is being assembled.
#[derive(Debug)]
pub struct TableMerger {
    table: Option<WideTable>,
    counts: CellCounts,
    width: Duration,
}

impl TableMerger {
    pub fn new(width: Duration) -> Self {
        Self {
            table: None,
            counts: CellCounts::new(),
            width,
        }
    }

    /// Fold one resampled series into the table.
    pub fn merge(&mut self, series: &PollutantSeries) -> MergeAction {
        // ---
        let ((table, counts), action) = match self.table.take() {
            None => (insert(series), MergeAction::Insert),
            Some(table) if table.has_column(&series.species) => (
                reaverage(&table, &self.counts, series, self.width),
                MergeAction::Reaverage,
            ),
            Some(table) => (inner_join(&table, &self.counts, series), MergeAction::Join),
        };

        debug!(
            species = %series.species,
            ?action,
            rows = table.len(),
            columns = table.columns().len(),
            "merged series"
        );

        self.table = Some(table);
        self.counts = counts;
        action
    }

    /// Hand over the finished table, or report that nothing was merged.
    pub fn finish(self) -> Result<WideTable, PipelineError> {
        self.table.ok_or(PipelineError::EmptyDataset)
    }
}

fn insert(series: &PollutantSeries) -> (WideTable, CellCounts) {
    // ---
    let table = WideTable::from_series(series);
    let counts = table.timestamps().into_iter().map(|ts| (ts, vec![1])).collect();
    (table, counts)
}

/// Concatenate `series` under its existing column and average per bucket.
///
/// Existing cells are weighted by how many series already fed them. Other
/// species keep their values and new timestamps get empty cells for them.
fn reaverage(
    table: &WideTable,
    counts: &CellCounts,
    series: &PollutantSeries,
    width: Duration,
) -> (WideTable, CellCounts) {
    // ---
    let columns = table.columns().to_vec();
    let target = table.column_index(&series.species).unwrap_or_default();
    let mut sums = BucketSums::new(columns.len(), width);

    for (ts, row) in table.rows() {
        let weights = counts.get(ts);
        let slot = sums.slot(*ts);
        for (col, cell) in row.iter().enumerate() {
            if let Some(v) = cell {
                let n = weights.and_then(|w| w.get(col)).copied().unwrap_or(1).max(1);
                slot[col].0 += v * n as f64;
                slot[col].1 += n;
            }
        }
    }
    for point in &series.points {
        let slot = sums.slot(point.timestamp);
        slot[target].0 += point.value;
        slot[target].1 += 1;
    }

    let (rows, counts) = sums.into_means();
    (WideTable::from_parts(columns, rows), counts)
}

/// Running (sum, count) per column for each bucket.
struct BucketSums {
    buckets: BTreeMap<NaiveDateTime, Vec<(f64, usize)>>,
    columns: usize,
    width: Duration,
}

impl BucketSums {
    fn new(columns: usize, width: Duration) -> Self {
        Self {
            buckets: BTreeMap::new(),
            columns,
            width,
        }
    }

    fn slot(&mut self, ts: NaiveDateTime) -> &mut Vec<(f64, usize)> {
        let columns = self.columns;
        self.buckets
            .entry(bucket_start(ts, self.width))
            .or_insert_with(|| vec![(0.0, 0); columns])
    }

    fn into_means(self) -> (BTreeMap<NaiveDateTime, Vec<Option<f64>>>, CellCounts) {
        let mut rows = BTreeMap::new();
        let mut counts = CellCounts::new();
        for (ts, cells) in self.buckets {
            let row = cells
                .iter()
                .map(|&(sum, n)| (n > 0).then(|| sum / n as f64))
                .collect();
            rows.insert(ts, row);
            counts.insert(ts, cells.into_iter().map(|(_, n)| n).collect());
        }
        (rows, counts)
    }
}

/// Append `series` as a new column, keeping only timestamps both sides share.
fn inner_join(
    table: &WideTable,
    counts: &CellCounts,
    series: &PollutantSeries,
) -> (WideTable, CellCounts) {
    // ---
    let incoming: BTreeMap<NaiveDateTime, f64> = series
        .points
        .iter()
        .map(|p| (p.timestamp, p.value))
        .collect();

    let mut columns = table.columns().to_vec();
    columns.push(series.species.clone());

    let mut joined_counts = CellCounts::new();
    let rows = table
        .rows()
        .filter_map(|(ts, row)| {
            incoming.get(ts).map(|v| {
                let mut joined = row.clone();
                joined.push(Some(*v));

                let mut weights = counts
                    .get(ts)
                    .cloned()
                    .unwrap_or_else(|| vec![1; row.len()]);
                weights.push(1);
                joined_counts.insert(*ts, weights);

                (*ts, joined)
            })
        })
        .collect();

    (WideTable::from_parts(columns, rows), joined_counts)
}
