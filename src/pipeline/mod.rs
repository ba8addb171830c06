//! Alignment and windowing pipeline gateway.
//!
//! Stages are private siblings; callers only see what this module re-exports
//! (EMBP). Data flows:
//!
//! raw files → `assemble` (per species: `impute` → `resample`) → `merge`
//! → wide table → `window`.

mod assemble;
mod impute;
mod merge;
mod resample;
mod window;

pub use assemble::DatasetAssembler;
pub use impute::{fill_missing, passes_quality_gate};
pub use merge::{MergeAction, TableMerger};
pub use resample::{bucket_start, resample_mean};
pub use window::{forecast_block, split_partitions, to_blocks, to_supervised, Partitions, SplitPolicy};
