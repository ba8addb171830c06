//! Slicing the dense table into blocks and supervised pairs.

use tracing::info;

use crate::error::PipelineError;
use crate::models::{block_shape, Row, SupervisedPair, WindowBlock};

// ---

/// Tail lengths for the test and validation partitions.
///
/// Train takes whatever precedes them. Every partition must be a multiple of
/// `lag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitPolicy {
    pub test_rows: usize,
    pub validate_rows: usize,
    pub lag: usize,
}

/// Chronologically ordered block sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct Partitions {
    pub train: Vec<WindowBlock>,
    pub test: Vec<WindowBlock>,
    pub validate: Vec<WindowBlock>,
}

/// Reshape `rows` into consecutive blocks of `lag` rows.
///
/// A trailing remainder shorter than `lag` is dropped.
pub fn to_blocks(rows: &[Row], lag: usize) -> Vec<WindowBlock> {
    if lag == 0 {
        return Vec::new();
    }
    rows.chunks_exact(lag)
        .map(|chunk| WindowBlock {
            rows: chunk.to_vec(),
        })
        .collect()
}

/// Split `rows` into train / test / validate and block each partition.
///
/// Sizes are checked for every partition before any block is built.
pub fn split_partitions(rows: &[Row], policy: SplitPolicy) -> Result<Partitions, PipelineError> {
    // ---
    let SplitPolicy {
        test_rows,
        validate_rows,
        lag,
    } = policy;

    if lag == 0 {
        return Err(PipelineError::InvalidConfig("lag must be greater than zero".into()));
    }

    let tail = test_rows.checked_add(validate_rows).ok_or_else(|| {
        PipelineError::InvalidConfig(format!(
            "test rows {} plus validate rows {} overflows",
            test_rows, validate_rows
        ))
    })?;
    if tail > rows.len() {
        return Err(PipelineError::InsufficientRows {
            needed: tail,
            available: rows.len(),
        });
    }

    let train_end = rows.len() - tail;
    let test_end = train_end + test_rows;

    for (partition, len) in [
        ("train", train_end),
        ("test", test_rows),
        ("validate", validate_rows),
    ] {
        if len % lag != 0 {
            return Err(PipelineError::PartitionSize {
                partition,
                rows: len,
                lag,
            });
        }
    }

    let partitions = Partitions {
        train: to_blocks(&rows[..train_end], lag),
        test: to_blocks(&rows[train_end..test_end], lag),
        validate: to_blocks(&rows[test_end..], lag),
    };

    info!(
        "Train shape: {:?}, Test shape: {:?} and Validate shape: {:?}",
        block_shape(&partitions.train),
        block_shape(&partitions.test),
        block_shape(&partitions.validate)
    );
    Ok(partitions)
}

/// The most recent `lag` rows as a single block for one forward prediction.
pub fn forecast_block(rows: &[Row], lag: usize) -> Result<WindowBlock, PipelineError> {
    // ---
    if lag == 0 {
        return Err(PipelineError::InvalidConfig("lag must be greater than zero".into()));
    }
    if rows.len() < lag {
        return Err(PipelineError::InsufficientRows {
            needed: lag,
            available: rows.len(),
        });
    }

    let block = WindowBlock {
        rows: rows[rows.len() - lag..].to_vec(),
    };
    info!("Forecast dataset shape: {:?}", block_shape(std::slice::from_ref(&block)));
    Ok(block)
}

/// Flatten `blocks` and slide a unit-step window over the rows.
///
/// Each pair's input is `n_input` rows starting at `pos`; its target is the
/// row `n_out` steps after the window ends, at `pos + n_input + n_out - 1`.
/// Positions without enough trailing rows produce nothing, so the result
/// holds `max(0, rows - n_input - n_out + 1)` pairs. Zero `n_input` or
/// `n_out` yields no pairs.
pub fn to_supervised(blocks: &[WindowBlock], n_input: usize, n_out: usize) -> Vec<SupervisedPair> {
    // ---
    if n_input == 0 || n_out == 0 {
        return Vec::new();
    }

    let data: Vec<&Row> = blocks.iter().flat_map(|b| b.rows.iter()).collect();
    let span = match n_input.checked_add(n_out) {
        Some(span) if span <= data.len() => span,
        _ => return Vec::new(),
    };

    (0..=data.len() - span)
        .map(|pos| SupervisedPair {
            input: data[pos..pos + n_input].iter().map(|r| (*r).clone()).collect(),
            target: data[pos + span - 1].clone(),
        })
        .collect()
}
