//! Unusual price change detection.
//!
//! When a transaction touches a configured pool, the pool's latest observed
//! price is compared with today's forecasted trend. Deviations of at least
//! the full upper-band width are Critical, at least half of it High.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};

use crate::context::AgentContext;
use crate::forecast::PoolForecast;

use super::event::TransactionEvent;
use super::finding::{Finding, FindingCounter, FindingSeverity, FindingType};

pub const ALERT_ID: &str = "POOL-PRICE-1";

/// Source of the latest real price observation for a pool.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn latest_price(
        &self,
        protocol: &str,
        subgraph_url: &str,
        pool: &str,
    ) -> Result<Option<f64>>;
}

/// Severity tier for a deviation from the trend, if any.
pub fn classify_deviation(deviation: f64, upper_bound: f64) -> Option<FindingSeverity> {
    let magnitude = deviation.abs();
    if magnitude >= upper_bound {
        Some(FindingSeverity::Critical)
    } else if magnitude >= upper_bound / 2.0 {
        Some(FindingSeverity::High)
    } else {
        None
    }
}

pub struct PriceAnomalyMonitor {
    context: Arc<AgentContext>,
    prices: Arc<dyn PriceSource>,
    counter: FindingCounter,
}

impl PriceAnomalyMonitor {
    pub fn new(context: Arc<AgentContext>, prices: Arc<dyn PriceSource>, max_findings: usize) -> Self {
        Self {
            context,
            prices,
            counter: FindingCounter::new(max_findings),
        }
    }

    pub fn findings_emitted(&self) -> usize {
        self.counter.emitted()
    }

    pub async fn handle_transaction(&self, event: &TransactionEvent) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();
        if self.counter.is_exhausted() {
            return Ok(findings);
        }

        let settings = self.context.settings();
        let forecasts = self.context.forecasts();

        for (protocol, protocol_settings) in &settings.protocols {
            for pool in protocol_settings.pools.iter().filter(|p| event.involves(p)) {
                if self.counter.is_exhausted() {
                    return Ok(findings);
                }

                let Some(forecast) = forecasts.get(pool) else {
                    debug!("No forecast cached for {}, skipping", pool);
                    continue;
                };

                let latest = match self
                    .prices
                    .latest_price(protocol, &protocol_settings.subgraph_url, pool)
                    .await
                {
                    Ok(Some(latest)) => latest,
                    Ok(None) => {
                        debug!("No latest price for {}, skipping", pool);
                        continue;
                    },
                    Err(e) => {
                        warn!("Failed to fetch latest price for {}: {:#}", pool, e);
                        continue;
                    },
                };

                let deviation = latest - forecast.trend;
                let Some(severity) = classify_deviation(deviation, forecast.upper_bound) else {
                    continue;
                };

                if !self.counter.try_acquire() {
                    return Ok(findings);
                }
                findings.push(build_finding(protocol, pool, latest, deviation, severity, forecast));
            }
        }

        Ok(findings)
    }
}

fn build_finding(
    protocol: &str,
    pool: &str,
    latest: f64,
    deviation: f64,
    severity: FindingSeverity,
    forecast: &PoolForecast,
) -> Finding {
    Finding::new(
        "Unusual Price Change",
        format!(
            "Pool {} price {} deviates from forecasted trend {} by {}",
            pool, latest, forecast.trend, deviation
        ),
        ALERT_ID,
        severity,
        FindingType::Suspicious,
    )
    .with_metadata("pool", pool)
    .with_metadata("protocol", protocol)
    .with_metadata("latest_price", latest)
    .with_metadata("trend", forecast.trend)
    .with_metadata("yhat", forecast.yhat)
    .with_metadata("upper_bound", forecast.upper_bound)
    .with_metadata("deviation", deviation)
}
