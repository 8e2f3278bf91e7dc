//! Job to refresh the stored daily price history of every monitored pool.
//!
//! Each pool's history file is rewritten from the protocol subgraph. A pool
//! that fails to refresh keeps its previous file; the job moves on to the
//! next pool.

use std::sync::Arc;

use anyhow::Result;
use log::{error, info, warn};

use crate::context::AgentContext;
use crate::subgraph::{GraphQlTransport, PoolDataFetcher, Protocol};

pub async fn run(context: &AgentContext, transport: &Arc<dyn GraphQlTransport>) -> Result<()> {
    info!("Starting refresh_pool_data job...");

    let start = std::time::Instant::now();
    let settings = context.settings();
    let fetcher = PoolDataFetcher::from_settings(transport.clone(), &settings);

    let mut refreshed = 0;
    let mut failed = 0;

    for (name, protocol_settings) in &settings.protocols {
        let Some(protocol) = Protocol::from_name(name) else {
            warn!(
                "Skipping {} pools of unsupported protocol {}",
                protocol_settings.pools.len(),
                name
            );
            continue;
        };

        for pool in &protocol_settings.pools {
            match fetcher
                .refresh_pool(protocol, &protocol_settings.subgraph_url, pool)
                .await
            {
                Ok(count) => {
                    info!("Stored {} daily prices for {} ({})", count, pool, name);
                    refreshed += 1;
                },
                Err(e) => {
                    error!("Failed to refresh history for {} ({}): {:#}", pool, name, e);
                    failed += 1;
                },
            }
        }
    }

    info!(
        "Completed refresh_pool_data job in {:?} ({} refreshed, {} failed)",
        start.elapsed(),
        refreshed,
        failed
    );
    Ok(())
}
