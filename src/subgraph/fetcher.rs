use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use moka::future::Cache;

use crate::config::Settings;
use crate::history::{HistoryStore, PricePoint};
use crate::monitor::PriceSource;

use super::client::{GraphQlTransport, SubgraphClient};
use super::uniswap::UniswapV3;

/// Latest observations are taken at least this far back to skip the
/// current, still-accumulating day.
const LATEST_OFFSET_SECS: i64 = 86_400;

/// Protocols with a subgraph integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    UniswapV3,
}

impl Protocol {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "uniswap-v3" => Some(Self::UniswapV3),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UniswapV3 => "uniswap-v3",
        }
    }
}

/// Pulls daily pool prices from protocol subgraphs into the history store.
#[derive(Clone)]
pub struct PoolDataFetcher {
    transport: Arc<dyn GraphQlTransport>,
    history: HistoryStore,
    start_timestamp: i64,
}

impl PoolDataFetcher {
    pub fn new(
        transport: Arc<dyn GraphQlTransport>,
        history: HistoryStore,
        start_timestamp: i64,
    ) -> Self {
        Self {
            transport,
            history,
            start_timestamp,
        }
    }

    pub fn from_settings(transport: Arc<dyn GraphQlTransport>, settings: &Settings) -> Self {
        Self::new(
            transport,
            HistoryStore::new(&settings.storage.pools_data_dir),
            settings.forecast.history_start_timestamp,
        )
    }

    /// All daily observations for `pool` since the configured start.
    pub async fn fetch_pool_history(
        &self,
        protocol: Protocol,
        subgraph_url: &str,
        pool: &str,
    ) -> Result<Vec<PricePoint>> {
        let client = SubgraphClient::new(self.transport.clone(), subgraph_url);
        match protocol {
            Protocol::UniswapV3 => {
                UniswapV3::new(&client)
                    .pool_history(pool, self.start_timestamp)
                    .await
            },
        }
    }

    /// Fetches the pool's full history and overwrites its history file.
    /// Returns the number of observations written.
    pub async fn refresh_pool(
        &self,
        protocol: Protocol,
        subgraph_url: &str,
        pool: &str,
    ) -> Result<usize> {
        let points = self.fetch_pool_history(protocol, subgraph_url, pool).await?;

        let history = self.history.clone();
        let pool_id = pool.to_string();
        let count = points.len();
        tokio::task::spawn_blocking(move || history.write(&pool_id, &points)).await??;

        Ok(count)
    }
}

/// [`PriceSource`] backed by protocol subgraphs with a short-lived cache.
#[derive(Clone)]
pub struct SubgraphPriceSource {
    transport: Arc<dyn GraphQlTransport>,
    cache: Cache<String, f64>,
}

impl SubgraphPriceSource {
    pub fn new(transport: Arc<dyn GraphQlTransport>, cache_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(cache_ttl)
            .build();

        Self { transport, cache }
    }

    /// The most recent complete-day observation for a pool.
    pub async fn latest_observation(
        &self,
        protocol: Protocol,
        subgraph_url: &str,
        pool: &str,
    ) -> Result<Option<PricePoint>> {
        let client = SubgraphClient::new(self.transport.clone(), subgraph_url);
        let before = Utc::now().timestamp() - LATEST_OFFSET_SECS;
        match protocol {
            Protocol::UniswapV3 => UniswapV3::new(&client).latest_observation(pool, before).await,
        }
    }
}

#[async_trait]
impl PriceSource for SubgraphPriceSource {
    async fn latest_price(
        &self,
        protocol: &str,
        subgraph_url: &str,
        pool: &str,
    ) -> Result<Option<f64>> {
        let Some(protocol) = Protocol::from_name(protocol) else {
            debug!("No price integration for protocol {}", protocol);
            return Ok(None);
        };

        let key = format!("{}:{}", protocol.name(), pool.to_lowercase());
        if let Some(price) = self.cache.get(&key).await {
            return Ok(Some(price));
        }

        let latest = self
            .latest_observation(protocol, subgraph_url, pool)
            .await?
            .map(|point| point.price);

        if let Some(price) = latest {
            self.cache.insert(key, price).await;
        }

        Ok(latest)
    }
}
