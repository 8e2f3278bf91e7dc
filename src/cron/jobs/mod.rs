pub mod optimize_params;
pub mod refresh_forecasts;
pub mod refresh_pool_data;
pub mod reload_config;
