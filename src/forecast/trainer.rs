use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::debug;
use serde::Serialize;

use crate::config::Settings;
use crate::history::{resample_daily, DailyObservation, HistoryStore};

use super::model::ForecastModel;
use super::params::{ParamSource, ParamStore};
use super::split::TrainValidationSplit;

/// Forecast for one pool on one day; the cache entry read by the alerting path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PoolForecast {
    pub date: NaiveDate,
    pub trend: f64,
    pub yhat: f64,
    /// Width of the upper prediction band, never negative
    pub upper_bound: f64,
    pub params_source: ParamSource,
}

/// Fits per-pool models from stored history and tuned parameters.
#[derive(Debug, Clone)]
pub struct ForecastTrainer {
    history: HistoryStore,
    params: ParamStore,
    interval_width: f64,
}

impl ForecastTrainer {
    pub fn new(history: HistoryStore, params: ParamStore, interval_width: f64) -> Self {
        Self {
            history,
            params,
            interval_width,
        }
    }

    /// Trainer over the storage locations and band width in `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            HistoryStore::new(&settings.storage.pools_data_dir),
            ParamStore::new(&settings.storage.optimal_params_dir),
            settings.forecast.interval_width,
        )
    }

    pub fn param_store(&self) -> &ParamStore {
        &self.params
    }

    pub fn interval_width(&self) -> f64 {
        self.interval_width
    }

    /// Loads and resamples a pool's history.
    pub fn load_series(&self, pool: &str) -> Result<Vec<DailyObservation>> {
        let points = self
            .history
            .read(pool)
            .with_context(|| format!("Failed to load history for {}", pool))?;
        Ok(resample_daily(&points))
    }

    /// Fits the pool's model on its training frame and forecasts `day`.
    pub fn forecast(&self, pool: &str, day: NaiveDate) -> Result<PoolForecast> {
        let series = self.load_series(pool)?;
        let split = TrainValidationSplit::new(&series)
            .with_context(|| format!("Insufficient history for {}", pool))?;

        let (params, params_source) = self.params.load_or_default(pool);
        debug!(
            "Fitting {} on {} rows with {:?} parameters",
            pool,
            split.train.len(),
            params_source
        );

        let model = ForecastModel::fit(&split.train, &params, self.interval_width)
            .with_context(|| format!("Failed to fit model for {}", pool))?;
        let point = model.predict(day);

        Ok(PoolForecast {
            date: day,
            trend: point.trend,
            yhat: point.yhat,
            upper_bound: point.upper_bound(),
            params_source,
        })
    }
}
