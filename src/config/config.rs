use std::collections::BTreeMap;
use std::path::Path;

use config::{Config, ConfigError, File};
use serde::Deserialize;

/// Subgraph endpoint and monitored pools for one protocol.
///
/// Keyed by protocol name (e.g. `uniswap-v3`) in [`Settings::protocols`].
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ProtocolSettings {
    #[serde(rename = "subgraph-url")]
    pub subgraph_url: String,
    #[serde(default)]
    pub pools: Vec<String>,
}

/// On-disk locations for pool history and tuned hyperparameters.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageSettings {
    #[serde(default = "default_pools_data_dir")]
    pub pools_data_dir: String,
    #[serde(default = "default_optimal_params_dir")]
    pub optimal_params_dir: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            pools_data_dir: default_pools_data_dir(),
            optimal_params_dir: default_optimal_params_dir(),
        }
    }
}

fn default_pools_data_dir() -> String {
    "./pools_data".to_string()
}

fn default_optimal_params_dir() -> String {
    "./optimal_params".to_string()
}

/// JSON-RPC endpoint used for receipts, balances and block polling.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChainSettings {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_tip_poll_interval")]
    pub tip_poll_interval_milliseconds: u64,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            tip_poll_interval_milliseconds: default_tip_poll_interval(),
        }
    }
}

fn default_rpc_url() -> String {
    "http://localhost:8545".to_string()
}

fn default_tip_poll_interval() -> u64 {
    2_000
}

/// Forecasting and hyperparameter search configuration.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ForecastSettings {
    /// Unix timestamp of the oldest daily observation to fetch (2021-05-04)
    #[serde(default = "default_history_start_timestamp")]
    pub history_start_timestamp: i64,
    #[serde(default = "default_search_trials")]
    pub search_trials: usize,
    /// Fixed RNG seed for reproducible searches; entropy when unset
    #[serde(default)]
    pub search_seed: Option<u64>,
    /// Coverage of the prediction band used as the alert threshold
    #[serde(default = "default_interval_width")]
    pub interval_width: f64,
    #[serde(default = "default_latest_price_cache_secs")]
    pub latest_price_cache_secs: u64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            history_start_timestamp: default_history_start_timestamp(),
            search_trials: default_search_trials(),
            search_seed: None,
            interval_width: default_interval_width(),
            latest_price_cache_secs: default_latest_price_cache_secs(),
        }
    }
}

fn default_history_start_timestamp() -> i64 {
    1_620_086_400
}

fn default_search_trials() -> usize {
    100
}

fn default_interval_width() -> f64 {
    0.95
}

fn default_latest_price_cache_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PriceMonitorSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for PriceMonitorSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Gas usage thresholds. Severity is Critical above `critical_threshold`,
/// High above `high_threshold`, Medium otherwise once `medium_threshold` is met.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GasMonitorSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_medium_gas")]
    pub medium_threshold: u64,
    #[serde(default = "default_high_gas")]
    pub high_threshold: u64,
    #[serde(default = "default_critical_gas")]
    pub critical_threshold: u64,
}

impl Default for GasMonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            medium_threshold: default_medium_gas(),
            high_threshold: default_high_gas(),
            critical_threshold: default_critical_gas(),
        }
    }
}

fn default_medium_gas() -> u64 {
    1_000_000
}

fn default_high_gas() -> u64 {
    3_000_000
}

fn default_critical_gas() -> u64 {
    7_000_000
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BalanceMonitorSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_balance_account")]
    pub account: String,
    /// Minimum balance in wei (0.5 ETH by default)
    #[serde(default = "default_min_balance_wei")]
    pub min_balance_wei: u64,
}

impl Default for BalanceMonitorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            account: default_balance_account(),
            min_balance_wei: default_min_balance_wei(),
        }
    }
}

fn default_balance_account() -> String {
    "0x6efef34e81fd201edf18c7902948168e9ebb88ae".to_string()
}

fn default_min_balance_wei() -> u64 {
    500_000_000_000_000_000
}

/// Monitor toggles and thresholds.
///
/// `max_findings` caps each rate-limited monitor for the lifetime of the
/// process; the counter is never reset.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MonitorSettings {
    #[serde(default = "default_max_findings")]
    pub max_findings: usize,
    #[serde(default)]
    pub price: PriceMonitorSettings,
    #[serde(default)]
    pub gas: GasMonitorSettings,
    #[serde(default)]
    pub balance: BalanceMonitorSettings,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            max_findings: default_max_findings(),
            price: PriceMonitorSettings::default(),
            gas: GasMonitorSettings::default(),
            balance: BalanceMonitorSettings::default(),
        }
    }
}

fn default_max_findings() -> usize {
    5
}

fn default_true() -> bool {
    true
}

/// Intervals for the background jobs.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CronSettings {
    #[serde(default = "default_config_reload_interval")]
    pub config_reload_interval_secs: u64,
    #[serde(default = "default_pool_data_interval")]
    pub pool_data_interval_secs: u64,
    #[serde(default = "default_param_search_interval")]
    pub param_search_interval_secs: u64,
    #[serde(default = "default_forecast_refresh_interval")]
    pub forecast_refresh_interval_secs: u64,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            config_reload_interval_secs: default_config_reload_interval(),
            pool_data_interval_secs: default_pool_data_interval(),
            param_search_interval_secs: default_param_search_interval(),
            forecast_refresh_interval_secs: default_forecast_refresh_interval(),
        }
    }
}

fn default_config_reload_interval() -> u64 {
    3_600 // 1 hour
}

fn default_pool_data_interval() -> u64 {
    86_400 // 1 day
}

fn default_param_search_interval() -> u64 {
    604_800 // 1 week
}

fn default_forecast_refresh_interval() -> u64 {
    21_600 // 6 hours
}

/// Root application configuration.
///
/// Loaded from `config.json` at startup and reloaded periodically; every
/// reload replaces the previous settings wholesale. Only `protocols` is
/// required.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub protocols: BTreeMap<String, ProtocolSettings>,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub chain: ChainSettings,
    #[serde(default)]
    pub forecast: ForecastSettings,
    #[serde(default)]
    pub monitors: MonitorSettings,
    #[serde(default)]
    pub cron: CronSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        s.try_deserialize()
    }

    /// Loads settings from an explicit file path (format inferred from extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        s.try_deserialize()
    }

    /// Iterates every configured `(protocol, pool)` pair.
    pub fn pools(&self) -> impl Iterator<Item = (&str, &str)> {
        self.protocols.iter().flat_map(|(protocol, settings)| {
            settings
                .pools
                .iter()
                .map(move |pool| (protocol.as_str(), pool.as_str()))
        })
    }
}
