//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Reloading settings from the config file
//! - Refreshing stored pool price history from the subgraphs
//! - Tuning per-pool forecast hyperparameters
//! - Rebuilding the forecast snapshot read by the price monitor

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::config::{CronSettings, Settings};
use crate::context::AgentContext;
use crate::subgraph::GraphQlTransport;

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
///
/// Intervals are read once at construction; changing them requires a restart.
pub struct CronScheduler {
    context: Arc<AgentContext>,
    transport: Arc<dyn GraphQlTransport>,
    settings: Arc<CronSettings>,
}

impl CronScheduler {
    pub fn new(context: Arc<AgentContext>, transport: Arc<dyn GraphQlTransport>) -> Self {
        let settings = Arc::new(context.settings().cron.clone());
        Self {
            context,
            transport,
            settings,
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_reload_config_job(&scheduler).await?;
        self.register_refresh_pool_data_job(&scheduler).await?;
        self.register_optimize_params_job(&scheduler).await?;
        self.register_refresh_forecasts_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 4);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_reload_config_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let context = self.context.clone();
        let interval = self.settings.config_reload_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let context = context.clone();
            Box::pin(async move {
                if let Err(e) = jobs::reload_config::run(&context, Settings::new) {
                    error!("Failed to reload config: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered reload_config job (every {}s)", interval);
        Ok(())
    }

    async fn register_refresh_pool_data_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let context = self.context.clone();
        let transport = self.transport.clone();
        let interval = self.settings.pool_data_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let context = context.clone();
            let transport = transport.clone();
            Box::pin(async move {
                if let Err(e) = jobs::refresh_pool_data::run(&context, &transport).await {
                    error!("Failed to refresh pool data: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered refresh_pool_data job (every {}s)", interval);
        Ok(())
    }

    async fn register_optimize_params_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let context = self.context.clone();
        let interval = self.settings.param_search_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let context = context.clone();
            Box::pin(async move {
                if let Err(e) = jobs::optimize_params::run(&context).await {
                    error!("Failed to optimize parameters: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered optimize_params job (every {}s)", interval);
        Ok(())
    }

    async fn register_refresh_forecasts_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let context = self.context.clone();
        let interval = self.settings.forecast_refresh_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let context = context.clone();
            Box::pin(async move {
                if let Err(e) = jobs::refresh_forecasts::run(&context).await {
                    error!("Failed to refresh forecasts: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered refresh_forecasts job (every {}s)", interval);
        Ok(())
    }
}
