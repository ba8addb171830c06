//! Raw file source: discovery, decoding and remote download of per-site CSVs.
//!
//! The pipeline only reads files. Fetching and directory cleanup live here so
//! the forecast driver can refresh its input directory before a run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Europe::London;
use glob::{glob, Pattern};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::RunMode;
use crate::error::PipelineError;
use crate::models::RawReading;

// ---

/// Timestamp layouts seen in downloaded files, tried in order.
const TIMESTAMP_FORMATS: [&str; 5] = [
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
];

/// Species requested from the download endpoint.
const DOWNLOAD_SPECIES: [&str; 5] = ["COm", "NOm", "NOXm", "PM10m", "PM25m"];

/// Date format the download endpoint expects, e.g. `01-Jan-2019`.
pub const DOWNLOAD_DATE_FORMAT: &str = "%d-%b-%Y";

/// One CSV record as written by the download endpoint.
///
/// `Units` is present in every file but not declared, so serde skips it.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "Site")]
    site: String,
    #[serde(rename = "Species")]
    species: String,
    #[serde(rename = "ReadingDateTime")]
    reading_date_time: String,
    #[serde(rename = "Value", deserialize_with = "csv::invalid_option")]
    value: Option<f64>,
    #[serde(rename = "Provisional or Ratified", default)]
    ratified: String,
}

/// All `*.csv` files in `dir`, sorted lexicographically.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    // ---
    // The directory is matched literally; only the file name is a wildcard.
    let pattern = format!("{}/*.csv", Pattern::escape(&dir.to_string_lossy()));
    let mut files: Vec<PathBuf> = glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable entry {}: {}", e.path().display(), e.error());
                None
            }
        })
        .collect();
    files.sort();

    debug!("Discovered {} csv files in {}", files.len(), dir.display());
    Ok(files)
}

/// Parse a timestamp in any of the supported layouts.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Decode one raw per-site file.
///
/// Empty or non-numeric `Value` cells become missing values. An unparseable
/// timestamp fails the whole file.
pub fn read_raw_readings(path: &Path) -> Result<Vec<RawReading>, PipelineError> {
    // ---
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut readings = Vec::new();
    for record in reader.deserialize::<CsvRow>() {
        let row = record?;
        let timestamp =
            parse_timestamp(&row.reading_date_time).ok_or_else(|| PipelineError::Timestamp {
                file: path.display().to_string(),
                value: row.reading_date_time.clone(),
            })?;

        readings.push(RawReading {
            site_id: row.site,
            species: row.species,
            timestamp,
            value: row.value,
            ratified: row.ratified,
        });
    }

    debug!("Read {} readings from {}", readings.len(), path.display());
    Ok(readings)
}

/// Remove every `*.csv` file in `dir`. A missing directory is not an error.
pub fn clear_csv_files(dir: &Path) -> Result<usize> {
    // ---
    if !dir.exists() {
        return Ok(0);
    }

    let files = discover_csv_files(dir)?;
    for file in &files {
        std::fs::remove_file(file)
            .with_context(|| format!("Failed to remove {}", file.display()))?;
    }

    info!("Removed {} stale csv files from {}", files.len(), dir.display());
    Ok(files.len())
}

/// Inclusive start / exclusive end dates for a download, in endpoint format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadWindow {
    pub start: String,
    pub end: String,
}

/// Calendar date in London at `now`. The source publishes London days.
pub fn london_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&London).date_naive()
}

/// Date range to fetch for `mode`.
///
/// Training uses a fixed historical window. Forecasting fetches `today` only,
/// since the endpoint treats `end` as exclusive.
pub fn download_window(mode: RunMode, today: NaiveDate) -> DownloadWindow {
    // ---
    match mode {
        RunMode::Train => DownloadWindow {
            start: "01-Jan-2019".to_string(),
            end: "25-Dec-2020".to_string(),
        },
        RunMode::Forecast => DownloadWindow {
            start: today.format(DOWNLOAD_DATE_FORMAT).to_string(),
            end: (today + Duration::days(1))
                .format(DOWNLOAD_DATE_FORMAT)
                .to_string(),
        },
    }
}

/// Downloads per-site CSV files from the air quality endpoint.
#[derive(Debug, Clone)]
pub struct SiteFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl SiteFetcher {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Full request URL for one site and date window.
    pub fn site_url(&self, site_id: &str, window: &DownloadWindow) -> String {
        // ---
        let species = DOWNLOAD_SPECIES
            .iter()
            .enumerate()
            .map(|(i, s)| format!("species{}={}", i + 1, s))
            .collect::<Vec<_>>()
            .join("&");

        format!(
            "{}?site={}&{}&species6=&start={}&end={}&res=6&period=15min&units=ugm3",
            self.base_url, site_id, species, window.start, window.end
        )
    }

    /// File name a site download is stored under.
    pub fn file_name(site_id: &str, window: &DownloadWindow) -> String {
        format!("{}_{}.csv", site_id, window.start)
    }

    /// Fetch one site into `dir`. Returns `false` and logs on failure.
    pub async fn download_site(&self, site_id: &str, window: &DownloadWindow, dir: &Path) -> bool {
        // ---
        match self.try_download(site_id, window, dir).await {
            Ok(path) => {
                info!(
                    "Downloaded site {} for {}..{} into {}",
                    site_id,
                    window.start,
                    window.end,
                    path.display()
                );
                true
            }
            Err(e) => {
                error!("Failed to download site {}: {:#}", site_id, e);
                false
            }
        }
    }

    async fn try_download(
        &self,
        site_id: &str,
        window: &DownloadWindow,
        dir: &Path,
    ) -> Result<PathBuf> {
        // ---
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let url = self.site_url(site_id, window);
        debug!("Fetching {}", url);

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        let path = dir.join(Self::file_name(site_id, window));
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Fetch every site in turn. Returns the number of successful downloads.
    pub async fn download_sites(
        &self,
        site_ids: &[String],
        window: &DownloadWindow,
        dir: &Path,
    ) -> usize {
        let mut ok = 0;
        for site in site_ids {
            if self.download_site(site, window, dir).await {
                ok += 1;
            }
        }
        info!("Downloaded {}/{} sites", ok, site_ids.len());
        ok
    }
}
