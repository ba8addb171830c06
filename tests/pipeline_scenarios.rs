//! End-to-end scenarios: raw CSV directories through to window blocks.

use std::{collections::HashMap, fs, path::Path};

use anyhow::Result;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tempfile::TempDir;
use uuid::Uuid;

use aqi_windows::config;
use aqi_windows::forecast::{self, ColumnMapping, Scorer};
use aqi_windows::models::block_shape;
use aqi_windows::pipeline::{split_partitions, to_supervised, DatasetAssembler, SplitPolicy};
use aqi_windows::{PipelineError, WindowBlock};

const HEADER: &str = "Site,Species,ReadingDateTime,Value,Units,Provisional or Ratified";

// ---

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

/// Half-hour grid timestamp `i` steps after `start()`.
fn slot(i: i64) -> NaiveDateTime {
    start() + Duration::minutes(30 * i)
}

/// Write a London Air style CSV. `None` values are written as empty cells.
fn write_site(dir: &Path, site: &str, rows: &[(&str, NaiveDateTime, Option<f64>)]) {
    let mut body = String::from(HEADER);
    body.push('\n');
    for (species, ts, value) in rows {
        body.push_str(&format!(
            "{},{},{},{},ug m-3,R\n",
            site,
            species,
            ts.format("%d/%m/%Y %H:%M"),
            value.map(|v| v.to_string()).unwrap_or_default()
        ));
    }
    fs::write(dir.join(format!("{}.csv", site)), body).unwrap();
}

fn species(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn mostly_missing_species_is_gated_out() {
    // ---
    let dir = TempDir::new().unwrap();

    let co: Vec<_> = (0..10).map(|i| ("CO", slot(i), Some(i as f64))).collect();
    write_site(dir.path(), "BL0", &co);

    // 6 of 10 NO readings missing.
    let no: Vec<_> = (0..10)
        .map(|i| ("NO", slot(i), (i % 5 < 2).then(|| 50.0 + i as f64)))
        .collect();
    write_site(dir.path(), "CT3", &no);

    let table = DatasetAssembler::new(species(&["CO", "NO"]))
        .assemble_dir(dir.path())
        .unwrap();

    assert_eq!(table.columns(), &species(&["CO"])[..]);
    assert_eq!(table.len(), 10);
    assert_eq!(table.get(slot(9), "CO"), Some(9.0));
}

#[test]
fn same_species_from_two_sites_is_averaged() {
    // ---
    let dir = TempDir::new().unwrap();
    write_site(
        dir.path(),
        "BL0",
        &[("NO", slot(0), Some(2.0)), ("NO", slot(1), Some(6.0)), ("NO", slot(2), Some(10.0))],
    );
    write_site(
        dir.path(),
        "KC1",
        &[("NO", slot(0), Some(4.0)), ("NO", slot(1), Some(8.0)), ("NO", slot(2), Some(12.0))],
    );

    let table = DatasetAssembler::new(species(&["NO"]))
        .assemble_dir(dir.path())
        .unwrap();

    assert_eq!(table.column("NO").unwrap(), vec![Some(3.0), Some(7.0), Some(11.0)]);
}

#[test]
fn three_sites_average_equally_whatever_the_file_order() {
    // ---
    let dir = TempDir::new().unwrap();
    for (site, value) in [("AA1", 3.0), ("BB2", 2.0), ("CC3", 1.0)] {
        write_site(dir.path(), site, &[("NO", slot(0), Some(value))]);
    }

    let table = DatasetAssembler::new(species(&["NO"]))
        .assemble_dir(dir.path())
        .unwrap();

    assert_eq!(table.get(slot(0), "NO"), Some(2.0));
}

#[test]
fn data_dir_with_glob_characters_is_read() {
    // ---
    let root = TempDir::new().unwrap();
    let dir = root.path().join("run[1]");
    fs::create_dir(&dir).unwrap();
    let co: Vec<_> = (0..4).map(|i| ("CO", slot(i), Some(i as f64))).collect();
    write_site(&dir, "BL0", &co);

    let table = DatasetAssembler::new(species(&["CO"]))
        .assemble_dir(&dir)
        .unwrap();

    assert_eq!(table.len(), 4);
    assert_eq!(table.get(slot(3), "CO"), Some(3.0));
}

#[test]
fn fifteen_minute_readings_land_on_half_hour_grid() {
    // ---
    let dir = TempDir::new().unwrap();
    let rows: Vec<_> = (0..8)
        .map(|i| ("PM10", start() + Duration::minutes(15 * i), Some(i as f64)))
        .collect();
    write_site(dir.path(), "WM0", &rows);

    let table = DatasetAssembler::new(species(&["PM10"]))
        .assemble_dir(dir.path())
        .unwrap();

    assert_eq!(table.timestamps(), (0..4).map(slot).collect::<Vec<_>>());
    assert_eq!(
        table.column("PM10").unwrap(),
        vec![Some(0.5), Some(2.5), Some(4.5), Some(6.5)]
    );
}

#[test]
fn new_species_shrinks_table_to_shared_timestamps() {
    // ---
    let dir = TempDir::new().unwrap();
    let co: Vec<_> = (0..6).map(|i| ("CO", slot(i), Some(1.0))).collect();
    let pm: Vec<_> = (3..9).map(|i| ("PM2.5", slot(i), Some(2.0))).collect();
    write_site(dir.path(), "BL0", &[co, pm].concat());

    let table = DatasetAssembler::new(species(&["CO", "PM2.5"]))
        .assemble_dir(dir.path())
        .unwrap();

    assert_eq!(table.timestamps(), vec![slot(3), slot(4), slot(5)]);
    assert!(table.len() <= 6);
}

#[test]
fn empty_directory_reports_empty_dataset() {
    // ---
    let dir = TempDir::new().unwrap();
    let err = DatasetAssembler::new(species(&["CO"]))
        .assemble_dir(dir.path())
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyDataset));
}

#[test]
fn twenty_rows_split_into_blocks() {
    // ---
    let dir = TempDir::new().unwrap();
    let rows: Vec<_> = (0..20)
        .flat_map(|i| [("CO", slot(i), Some(i as f64)), ("NO", slot(i), Some(100.0 + i as f64))])
        .collect();
    write_site(dir.path(), "HG1", &rows);

    let table = DatasetAssembler::new(species(&["CO", "NO"]))
        .assemble_dir(dir.path())
        .unwrap();
    assert_eq!(table.len(), 20);

    let policy = SplitPolicy {
        test_rows: 6,
        validate_rows: 2,
        lag: 2,
    };
    let parts = split_partitions(&table.values(), policy).unwrap();

    assert_eq!(block_shape(&parts.train), (6, 2, 2));
    assert_eq!(block_shape(&parts.test), (3, 2, 2));
    assert_eq!(block_shape(&parts.validate), (1, 2, 2));
    assert_eq!(parts.validate[0].rows[1], vec![19.0, 119.0]);

    let pairs = to_supervised(&parts.train, 2, 1);
    assert_eq!(pairs.len(), 12 - 2 - 1 + 1);
    assert_eq!(pairs[0].target, vec![2.0, 102.0]);
}

#[test]
fn training_driver_summarizes_shapes() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let rows: Vec<_> = (0..24).map(|i| ("CO", slot(i), Some(i as f64))).collect();
    write_site(dir.path(), "IS2", &rows);

    let vars: HashMap<&str, String> = [
        ("DATA_DIR", dir.path().display().to_string()),
        ("TRACKED_SPECIES", "CO".to_string()),
        ("FORECAST_COLUMN_ORDER", "CO".to_string()),
        ("TEST_ROWS", "8".to_string()),
        ("VALIDATE_ROWS", "4".to_string()),
    ]
    .into_iter()
    .collect();
    let cfg = config::load_from(|key| vars.get(key).cloned())?;

    let summary = forecast::prepare_training(&cfg)?;
    assert_eq!(summary.rows, 24);
    assert_eq!(summary.train_shape, (6, 2, 1));
    assert_eq!(summary.test_shape, (4, 2, 1));
    assert_eq!(summary.validate_shape, (2, 2, 1));
    assert_eq!(summary.supervised_pairs, 10);
    assert_eq!(summary.last_timestamp, Some(slot(23)));
    Ok(())
}

#[test]
fn training_driver_rejects_misaligned_split() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let rows: Vec<_> = (0..24).map(|i| ("CO", slot(i), Some(1.0))).collect();
    write_site(dir.path(), "IS2", &rows);

    let vars: HashMap<&str, String> = [
        ("DATA_DIR", dir.path().display().to_string()),
        ("TRACKED_SPECIES", "CO".to_string()),
        ("FORECAST_COLUMN_ORDER", "CO".to_string()),
        ("TEST_ROWS", "7".to_string()),
        ("VALIDATE_ROWS", "4".to_string()),
    ]
    .into_iter()
    .collect();
    let cfg = config::load_from(|key| vars.get(key).cloned())?;

    let err = forecast::prepare_training(&cfg).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::PartitionSize { .. })
    ));
    Ok(())
}

struct MeanOfBlock;

impl Scorer for MeanOfBlock {
    fn predict(&self, block: &WindowBlock) -> Result<Vec<f64>> {
        let n = block.len() as f64;
        Ok((0..block.width())
            .map(|col| block.rows.iter().map(|r| r[col]).sum::<f64>() / n)
            .collect())
    }
}

#[test]
fn forecast_block_follows_scorer_column_order() -> Result<()> {
    // ---
    let dir = TempDir::new()?;
    let mut rows = Vec::new();
    for i in 0..6 {
        rows.push(("CO", slot(i), Some(0.5)));
        rows.push(("NO", slot(i), Some(10.0 + i as f64)));
        rows.push(("PM10", slot(i), Some(20.0)));
        rows.push(("PM2.5", slot(i), Some(8.0)));
    }
    write_site(dir.path(), "SK8", &rows);

    let table = DatasetAssembler::new(species(&["CO", "NO", "PM10", "PM2.5"]))
        .assemble_dir(dir.path())?;
    let mapping = ColumnMapping::new(species(&["NO", "PM10", "PM2.5", "CO"]));
    let request = forecast::prepare_forecast(Uuid::new_v4(), &table, &mapping, 2)?;

    assert_eq!(request.shape, [1, 2, 4]);
    assert_eq!(request.block.rows[0], vec![14.0, 20.0, 8.0, 0.5]);
    assert_eq!(request.block.rows[1], vec![15.0, 20.0, 8.0, 0.5]);
    assert_eq!(request.period, "01-Jan-2020 03:00:00");

    let result = forecast::score(&request, &MeanOfBlock)?;
    assert_eq!(result.value("NO"), Some(14.5));
    assert_eq!(result.value("CO"), Some(0.5));

    let json = serde_json::to_value(&request)?;
    assert_eq!(json["columns"][0], "NO");
    Ok(())
}
