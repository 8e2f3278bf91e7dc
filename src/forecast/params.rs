use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// How the yearly seasonality combines with the trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonalityMode {
    Additive,
    Multiplicative,
}

/// Model hyperparameters, persisted per pool as a flat JSON mapping.
///
/// Keys missing from a stored mapping take the default value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub changepoint_prior_scale: f64,
    pub changepoint_range: f64,
    pub seasonality_mode: SeasonalityMode,
    pub seasonality_prior_scale: f64,
    /// Fourier order of the yearly seasonality
    pub yearly_seasonality: u32,
    /// Kept for compatibility with stored mappings; no holiday calendar is modelled
    pub holidays_prior_scale: f64,
}

impl Default for Hyperparameters {
    /// Pre-trained parameters used when a pool has no tuned set.
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.45630165790829486,
            changepoint_range: 0.16656098641709344,
            seasonality_mode: SeasonalityMode::Additive,
            seasonality_prior_scale: 9.144413372447056,
            yearly_seasonality: 5,
            holidays_prior_scale: 6.520734116879363,
        }
    }
}

/// Where a pool's hyperparameters came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamSource {
    Tuned,
    Default,
}

/// Per-pool hyperparameter files at `<dir>/<pool>.json`.
#[derive(Debug, Clone)]
pub struct ParamStore {
    dir: PathBuf,
}

impl ParamStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, pool: &str) -> PathBuf {
        self.dir.join(format!("{pool}.json"))
    }

    /// Reads the pool's tuned parameters. `Ok(None)` when no file exists.
    pub fn read(&self, pool: &str) -> Result<Option<Hyperparameters>> {
        let path = self.path_for(pool);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            },
        };

        let params = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid hyperparameters in {}", path.display()))?;
        Ok(Some(params))
    }

    /// Resolves the parameters to train with, falling back to the defaults
    /// when the pool's file is absent or unreadable.
    pub fn load_or_default(&self, pool: &str) -> (Hyperparameters, ParamSource) {
        match self.read(pool) {
            Ok(Some(params)) => (params, ParamSource::Tuned),
            Ok(None) => {
                debug!("No tuned hyperparameters for {}, using defaults", pool);
                (Hyperparameters::default(), ParamSource::Default)
            },
            Err(e) => {
                warn!("Ignoring hyperparameters for {}: {:#}", pool, e);
                (Hyperparameters::default(), ParamSource::Default)
            },
        }
    }

    /// Writes the pool's parameters, flushed and fsynced before returning.
    pub fn write(&self, pool: &str, params: &Hyperparameters) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(pool);
        let mut file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer(&mut file, params)?;
        file.flush()?;
        file.sync_all()?;

        Ok(())
    }
}
