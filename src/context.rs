use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::config::Settings;
use crate::forecast::PoolForecast;

/// Immutable set of per-pool forecasts produced by one refresh.
#[derive(Debug, Clone, Default)]
pub struct ForecastSnapshot {
    pub generated_at: Option<DateTime<Utc>>,
    forecasts: HashMap<String, PoolForecast>,
}

impl ForecastSnapshot {
    pub fn new(generated_at: DateTime<Utc>, forecasts: HashMap<String, PoolForecast>) -> Self {
        Self {
            generated_at: Some(generated_at),
            forecasts: forecasts
                .into_iter()
                .map(|(pool, forecast)| (pool.to_lowercase(), forecast))
                .collect(),
        }
    }

    /// Case-insensitive lookup by pool id.
    pub fn get(&self, pool: &str) -> Option<&PoolForecast> {
        self.forecasts.get(&pool.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forecasts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PoolForecast)> {
        self.forecasts.iter()
    }
}

/// Shared state for the event handlers and background jobs.
///
/// Settings and forecasts are published as whole snapshots: writers build a
/// replacement off to the side and swap it in, readers hold an `Arc` to
/// whichever snapshot was current when they loaded it.
pub struct AgentContext {
    settings: ArcSwap<Settings>,
    forecasts: ArcSwap<ForecastSnapshot>,
}

impl AgentContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: ArcSwap::from_pointee(settings),
            forecasts: ArcSwap::from_pointee(ForecastSnapshot::default()),
        }
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn replace_settings(&self, settings: Settings) {
        self.settings.store(Arc::new(settings));
    }

    pub fn forecasts(&self) -> Arc<ForecastSnapshot> {
        self.forecasts.load_full()
    }

    pub fn publish_forecasts(&self, snapshot: ForecastSnapshot) {
        self.forecasts.store(Arc::new(snapshot));
    }
}
