//! Air quality alignment and windowing pipeline.
//!
//! Turns irregular per-site, per-species sensor files into a fixed-cadence
//! wide table and slices it into supervised windows for a forecasting model.
//!
//! Module layout follows the Explicit Module Boundary Pattern (EMBP): the
//! `pipeline` gateway owns its stages, and this file re-exports only what
//! callers (`main.rs`, integration tests) need.

pub mod config;
pub mod error;
pub mod forecast;
pub mod models;
pub mod pipeline;
pub mod source;

pub use config::{Config, RunMode};
pub use error::PipelineError;
pub use forecast::{ColumnMapping, DatasetSummary, Forecast, ForecastRequest, Scorer};
pub use models::{PollutantSeries, RawReading, SeriesPoint, SupervisedPair, WideTable, WindowBlock};
