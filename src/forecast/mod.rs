//! Per-pool price forecasting.
//!
//! - [`model`] - trend + yearly seasonality model with a prediction band
//! - [`split`] - train/validation partition of a daily series
//! - [`params`] - hyperparameters and their per-pool storage
//! - [`search`] - TPE hyperparameter search on validation MAE
//! - [`trainer`] - history → model → today's forecast

pub mod model;
pub mod params;
pub mod search;
pub mod split;
pub mod trainer;

pub use model::{ForecastModel, ForecastPoint};
pub use params::{Hyperparameters, ParamSource, ParamStore, SeasonalityMode};
pub use search::{mean_absolute_error, ParamSearch, SearchOutcome};
pub use split::TrainValidationSplit;
pub use trainer::{ForecastTrainer, PoolForecast};
