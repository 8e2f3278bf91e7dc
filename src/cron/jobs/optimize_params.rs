//! Job to tune forecast hyperparameters for every monitored pool.
//!
//! Runs a bounded TPE search per pool on its stored history and persists the
//! best parameters. Pools whose search fails keep their previous parameters.

use anyhow::{Context, Result};
use log::{error, info};

use crate::context::AgentContext;
use crate::forecast::{ForecastTrainer, ParamSearch, SearchOutcome, TrainValidationSplit};

pub async fn run(context: &AgentContext) -> Result<()> {
    info!("Starting optimize_params job...");

    let start = std::time::Instant::now();
    let settings = context.settings();
    let trainer = ForecastTrainer::from_settings(&settings);
    let search = ParamSearch::new(
        settings.forecast.search_trials,
        settings.forecast.search_seed,
        settings.forecast.interval_width,
    );

    let mut tuned = 0;
    let mut failed = 0;

    for (_, pool) in settings.pools() {
        let trainer = trainer.clone();
        let search = search.clone();
        let pool_id = pool.to_string();

        let result = tokio::task::spawn_blocking(move || optimize_pool(&trainer, &search, &pool_id))
            .await
            .context("Parameter search task panicked")?;

        match result {
            Ok(outcome) => {
                info!(
                    "Tuned {}: validation MAE {:.6} after {} trials ({} failed)",
                    pool, outcome.best_mae, outcome.completed_trials, outcome.failed_trials
                );
                tuned += 1;
            },
            Err(e) => {
                error!("Failed to tune parameters for {}: {:#}", pool, e);
                failed += 1;
            },
        }
    }

    info!(
        "Completed optimize_params job in {:?} ({} tuned, {} failed)",
        start.elapsed(),
        tuned,
        failed
    );
    Ok(())
}

fn optimize_pool(
    trainer: &ForecastTrainer,
    search: &ParamSearch,
    pool: &str,
) -> Result<SearchOutcome> {
    let series = trainer.load_series(pool)?;
    let split = TrainValidationSplit::new(&series)?;
    let outcome = search.run(&split)?;
    trainer.param_store().write(pool, &outcome.best)?;
    Ok(outcome)
}
