//! Application entry point for the `aqi-windows` batch pipeline.
//!
//! This binary runs one pipeline pass to completion:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Train mode: assembling the pre-fetched directory, splitting it into
//!   blocks and supervised pairs, and printing a JSON shape summary
//! - Forecast mode: refreshing the forecast directory from the remote source,
//!   assembling it, and printing the scorer request as JSON
//!
//! # Environment Variables
//! - `PIPELINE_MODE` (optional) – `train` or `forecast` (default: `train`)
//! - `PIPELINE_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `PIPELINE_SPAN_EVENTS` (optional) – span event mode for tracing
//!
//! See `config.rs` for the full list.
use std::env;

use anyhow::Result;
use chrono::Utc;
use dotenvy::dotenv;
use is_terminal::IsTerminal;
use tracing::Instrument;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use aqi_windows::config::{self, Config, RunMode};
use aqi_windows::forecast::{self, ColumnMapping};
use aqi_windows::source::{self, SiteFetcher};

// ---

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    dotenv().ok();
    init_tracing();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("pipeline", %run_id, mode = %cfg.mode);

    async move {
        match cfg.mode {
            RunMode::Train => run_train(&cfg),
            RunMode::Forecast => run_forecast(&cfg, run_id).await,
        }
    }
    .instrument(span)
    .await
}

fn run_train(cfg: &Config) -> Result<()> {
    // ---
    let summary = forecast::prepare_training(cfg)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_forecast(cfg: &Config, run_id: uuid::Uuid) -> Result<()> {
    // ---
    let window = source::download_window(RunMode::Forecast, source::london_date(Utc::now()));
    source::clear_csv_files(&cfg.data_dir)?;

    let fetcher = SiteFetcher::new(
        cfg.source_api_url.clone(),
        std::time::Duration::from_secs(cfg.fetch_timeout_secs),
    )?;
    fetcher
        .download_sites(&cfg.site_ids, &window, &cfg.data_dir)
        .await;

    let table = forecast::assemble(cfg, &cfg.data_dir)?;
    let mapping = ColumnMapping::new(cfg.forecast_order.clone());
    let request = forecast::prepare_forecast(run_id, &table, &mapping, cfg.lag)?;

    tracing::info!("Forecast period: {}", request.period);
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}

// ---

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Output on stderr, leaving stdout for the JSON result
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `PIPELINE_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `PIPELINE_LOG_LEVEL` env var
///
/// This should be called once at startup before any logging or tracing
/// macros are invoked.
fn init_tracing() {
    // ---
    let span_events = match env::var("PIPELINE_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stderr().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to PIPELINE_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("PIPELINE_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("{level},reqwest=warn,hyper=warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
