#[allow(clippy::module_inception)]
mod config;

pub use config::{
    BalanceMonitorSettings, ChainSettings, CronSettings, ForecastSettings, GasMonitorSettings,
    MonitorSettings, PriceMonitorSettings, ProtocolSettings, Settings, StorageSettings,
};
