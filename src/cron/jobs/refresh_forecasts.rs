//! Job to rebuild today's forecast for every monitored pool.
//!
//! Pools are fitted in parallel on the blocking pool. The results are
//! published as one new snapshot; a pool that fails to fit keeps the entry
//! it had in the previous snapshot, if any.

use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use log::{error, info};

use crate::context::{AgentContext, ForecastSnapshot};
use crate::forecast::ForecastTrainer;

pub async fn run(context: &AgentContext) -> Result<()> {
    info!("Starting refresh_forecasts job...");

    let start = std::time::Instant::now();
    let settings = context.settings();
    let trainer = ForecastTrainer::from_settings(&settings);
    let today = Utc::now().date_naive();

    let pools: Vec<String> = settings.pools().map(|(_, pool)| pool.to_string()).collect();
    let tasks = pools.iter().cloned().map(|pool| {
        let trainer = trainer.clone();
        tokio::task::spawn_blocking(move || trainer.forecast(&pool, today))
    });
    let results = join_all(tasks).await;

    let previous = context.forecasts();
    let mut forecasts = HashMap::with_capacity(pools.len());
    let mut carried_over = 0;

    for (pool, result) in pools.into_iter().zip(results) {
        let error = match result {
            Ok(Ok(forecast)) => {
                forecasts.insert(pool, forecast);
                continue;
            },
            Ok(Err(e)) => e,
            Err(e) => e.into(),
        };

        error!("Failed to refresh forecast for {}: {:#}", pool, error);
        if let Some(stale) = previous.get(&pool) {
            forecasts.insert(pool, *stale);
            carried_over += 1;
        }
    }

    let snapshot = ForecastSnapshot::new(Utc::now(), forecasts);
    let count = snapshot.len();
    context.publish_forecasts(snapshot);

    info!(
        "Completed refresh_forecasts job in {:?} ({} pools, {} carried over)",
        start.elapsed(),
        count,
        carried_over
    );
    Ok(())
}
