use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Date format written to the `date` column.
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single daily price observation for a pool.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: DateTime<Utc>,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: DateTime<Utc>, price: f64) -> Self {
        Self { date, price }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct HistoryRow {
    date: String,
    price: f64,
}

/// Per-pool price history persisted as `<dir>/<pool>.csv` with a
/// `date,price` header.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, pool: &str) -> PathBuf {
        self.dir.join(format!("{pool}.csv"))
    }

    /// Overwrites the pool's history file and fsyncs it before returning.
    pub fn write(&self, pool: &str, points: &[PricePoint]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(pool);
        let file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;

        let mut writer = csv::Writer::from_writer(file);
        for point in points {
            writer.serialize(HistoryRow {
                date: point.date.format(DATE_FORMAT).to_string(),
                price: point.price,
            })?;
        }

        // csv only emits the header alongside the first record
        if points.is_empty() {
            writer.write_record(["date", "price"])?;
        }

        let mut file = writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush {}: {}", path.display(), e))?;
        file.flush()?;
        file.sync_all()?;

        Ok(())
    }

    /// Reads the pool's history in file order.
    pub fn read(&self, pool: &str) -> Result<Vec<PricePoint>> {
        let path = self.path_for(pool);
        read_history(&path)
    }
}

fn read_history(path: &Path) -> Result<Vec<PricePoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut points = Vec::new();
    for (line, row) in reader.deserialize::<HistoryRow>().enumerate() {
        let row = row.with_context(|| format!("Invalid row {} in {}", line + 2, path.display()))?;
        let date = parse_date(&row.date)
            .with_context(|| format!("Invalid date '{}' in {}", row.date, path.display()))?;
        points.push(PricePoint::new(date, row.price));
    }

    Ok(points)
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, plain `YYYY-MM-DD` and RFC 3339.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, DATE_FORMAT) {
        return Ok(dt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    let dt = DateTime::parse_from_rfc3339(value)?;
    Ok(dt.with_timezone(&Utc))
}
