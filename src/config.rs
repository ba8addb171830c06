//! Configuration loader for the `aqi-windows` pipeline.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). Nothing else in the crate reads the environment.
//!
use std::{env, fmt, path::PathBuf, str::FromStr};

use anyhow::{anyhow, bail, Result};

use crate::models::{DEFAULT_FORECAST_ORDER, DEFAULT_SITE_IDS, DEFAULT_SPECIES};

/// Parse an optional integer variable with a default value.
macro_rules! parse_env_usize {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<usize>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional `u64` variable with a default value.
macro_rules! parse_env_u64 {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.trim().parse::<u64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional comma separated list with a default.
macro_rules! parse_env_list {
    ($lookup:expr, $var_name:expr, $default:expr) => {
        match $lookup($var_name) {
            Some(v) => split_list(&v),
            None => $default.iter().map(|s| s.to_string()).collect::<Vec<String>>(),
        }
    };
}

const DEFAULT_SOURCE_API_URL: &str = "http://www.londonair.org.uk/london/asp/downloadsite.asp";

// ---

/// Whether the run prepares training windows or a single forecast window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Forecast,
}

impl FromStr for RunMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(RunMode::Train),
            "forecast" => Ok(RunMode::Forecast),
            other => Err(anyhow!("Unknown PIPELINE_MODE '{}'", other)),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Train => write!(f, "train"),
            RunMode::Forecast => write!(f, "forecast"),
        }
    }
}

/// Strongly typed pipeline configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of one run.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    pub mode: RunMode,

    /// Directory holding the raw per-site CSV files.
    pub data_dir: PathBuf,

    /// Species extracted from each file, in extraction order.
    pub tracked_species: Vec<String>,

    /// Column order the external scorer expects.
    pub forecast_order: Vec<String>,

    /// Sites downloaded before a forecast run.
    pub site_ids: Vec<String>,

    /// Download endpoint for raw site files.
    pub source_api_url: String,

    /// HTTP timeout for a single site download.
    pub fetch_timeout_secs: u64,

    /// Rows per window block.
    pub lag: usize,

    /// Rows per supervised input window.
    pub n_input: usize,

    /// Offset of the supervised target after the input window.
    pub n_out: usize,

    /// Rows in the test partition.
    pub test_rows: usize,

    /// Rows in the validation partition (the final tail).
    pub validate_rows: usize,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `PIPELINE_MODE` – `train` or `forecast` (default: train)
/// - `DATA_DIR` – raw file directory (default: `./data/<mode>/`)
/// - `TRACKED_SPECIES` – default `CO,NO,PM10,PM2.5`
/// - `FORECAST_COLUMN_ORDER` – default `NO,PM10,PM2.5,CO`
/// - `SITE_IDS` – default Central London sites
/// - `SOURCE_API_URL` – download endpoint
/// - `FETCH_TIMEOUT_SECS` – default 60
/// - `WINDOW_LAG`, `N_INPUT`, `N_OUT` – default 2, 2, 1
/// - `TEST_ROWS`, `VALIDATE_ROWS` – default 6892, 48
///
/// Returns an error if any variable is invalid.
pub fn load_from_env() -> Result<Config> {
    load_from(|key| env::var(key).ok())
}

/// Load configuration from an arbitrary key lookup.
pub fn load_from<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    // ---
    let mode = match lookup("PIPELINE_MODE") {
        Some(v) => v.parse()?,
        None => RunMode::Train,
    };
    let data_dir = lookup("DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("./data/{}/", mode)));

    let cfg = Config {
        mode,
        data_dir,
        tracked_species: parse_env_list!(lookup, "TRACKED_SPECIES", DEFAULT_SPECIES),
        forecast_order: parse_env_list!(lookup, "FORECAST_COLUMN_ORDER", DEFAULT_FORECAST_ORDER),
        site_ids: parse_env_list!(lookup, "SITE_IDS", DEFAULT_SITE_IDS),
        source_api_url: lookup("SOURCE_API_URL")
            .unwrap_or_else(|| DEFAULT_SOURCE_API_URL.to_string()),
        fetch_timeout_secs: parse_env_u64!(lookup, "FETCH_TIMEOUT_SECS", 60),
        lag: parse_env_usize!(lookup, "WINDOW_LAG", 2),
        n_input: parse_env_usize!(lookup, "N_INPUT", 2),
        n_out: parse_env_usize!(lookup, "N_OUT", 1),
        test_rows: parse_env_usize!(lookup, "TEST_ROWS", 6892),
        validate_rows: parse_env_usize!(lookup, "VALIDATE_ROWS", 48),
    };

    cfg.validate()?;
    Ok(cfg)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Config {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.lag == 0 || self.n_input == 0 || self.n_out == 0 {
            bail!("WINDOW_LAG, N_INPUT and N_OUT must all be greater than zero");
        }
        if self.fetch_timeout_secs == 0 {
            bail!("FETCH_TIMEOUT_SECS must be greater than zero");
        }
        if self.test_rows.checked_add(self.validate_rows).is_none() {
            bail!("TEST_ROWS + VALIDATE_ROWS overflows");
        }
        if self.tracked_species.is_empty() {
            bail!("TRACKED_SPECIES must name at least one species");
        }
        if let Some(missing) = self
            .forecast_order
            .iter()
            .find(|s| !self.tracked_species.contains(s))
        {
            bail!(
                "FORECAST_COLUMN_ORDER names '{}', which is not a tracked species",
                missing
            );
        }
        let mut seen = self.forecast_order.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != self.forecast_order.len() {
            bail!("FORECAST_COLUMN_ORDER contains duplicates");
        }
        Ok(())
    }

    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  PIPELINE_MODE         : {}", self.mode);
        tracing::info!("  DATA_DIR              : {}", self.data_dir.display());
        tracing::info!("  TRACKED_SPECIES       : {}", self.tracked_species.join(","));
        tracing::info!("  FORECAST_COLUMN_ORDER : {}", self.forecast_order.join(","));
        tracing::info!("  SITE_IDS              : {}", self.site_ids.join(","));
        tracing::info!("  SOURCE_API_URL        : {}", self.source_api_url);
        tracing::info!("  FETCH_TIMEOUT_SECS    : {}", self.fetch_timeout_secs);
        tracing::info!("  WINDOW_LAG            : {}", self.lag);
        tracing::info!("  N_INPUT / N_OUT       : {} / {}", self.n_input, self.n_out);
        tracing::info!("  TEST_ROWS             : {}", self.test_rows);
        tracing::info!("  VALIDATE_ROWS         : {}", self.validate_rows);
    }
}
