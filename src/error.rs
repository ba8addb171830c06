//! Error taxonomy for the windowing pipeline.
//!
//! Only conditions the caller must act on are represented here. Quality-gate
//! rejections and short trailing data are handled where they occur and never
//! surface as errors.

use thiserror::Error;

// ---

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No species passed the quality gate in any input file.
    #[error("empty dataset: no tracked species had more present than missing values")]
    EmptyDataset,

    /// A split length is not a multiple of the block length.
    #[error("{partition} partition has {rows} rows, which is not a multiple of lag {lag}")]
    PartitionSize {
        partition: &'static str,
        rows: usize,
        lag: usize,
    },

    /// The table is too short for the requested split or forecast window.
    #[error("insufficient rows: needed {needed}, table has {available}")]
    InsufficientRows { needed: usize, available: usize },

    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("column '{0}' is not present in the wide table")]
    UnknownColumn(String),

    #[error("unparseable timestamp '{value}' in {file}")]
    Timestamp { file: String, value: String },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}
