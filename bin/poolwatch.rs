use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use poolwatch::{
    cron::jobs,
    monitor::RpcChainReader,
    subgraph::{GraphQlTransport, HttpTransport, SubgraphPriceSource},
    Agent, AgentContext, BlockPoller, CronScheduler, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialize logger")?;

    // Load configuration
    let settings = Settings::new()
        .context("Failed to load config.json. Please ensure it exists and is valid")?;

    let transport: Arc<dyn GraphQlTransport> =
        Arc::new(HttpTransport::new().context("Failed to build HTTP client")?);
    let chain = Arc::new(
        RpcChainReader::new(&settings.chain.rpc_url).context("Failed to create RPC provider")?,
    );
    let prices = Arc::new(SubgraphPriceSource::new(
        transport.clone(),
        Duration::from_secs(settings.forecast.latest_price_cache_secs),
    ));
    let poll_interval = Duration::from_millis(settings.chain.tip_poll_interval_milliseconds);

    let context = Arc::new(AgentContext::new(settings));

    // Fill history and forecasts before the first event is handled so the
    // price monitor does not start from an empty snapshot
    info!("Initializing pool history and forecasts...");
    if let Err(e) = jobs::refresh_pool_data::run(&context, &transport).await {
        error!("Initial pool data refresh failed: {:#}", e);
    }
    if let Err(e) = jobs::refresh_forecasts::run(&context).await {
        error!("Initial forecast refresh failed: {:#}", e);
    }

    let cancellation_token = CancellationToken::new();

    let agent = Arc::new(Agent::new(context.clone(), prices, chain.clone()));
    let poller = BlockPoller::new(agent, chain, poll_interval);

    let poller_token = cancellation_token.child_token();
    let poller_handle = tokio::spawn(async move {
        if let Err(e) = poller.run(poller_token).await {
            error!("Block poller failed: {:#}", e);
        }
    });

    info!("Block poller started - new blocks will be checked every {:?}", poll_interval);

    // Config reload, history refresh, parameter search, forecast refresh
    let cron_scheduler = CronScheduler::new(context.clone(), transport);

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - background jobs will run periodically");

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Agent running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");

    cancellation_token.cancel();

    info!("Waiting for block poller to stop...");
    let _ = poller_handle.await;

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("All tasks stopped");
    Ok(())
}
