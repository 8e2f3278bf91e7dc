//! Job to reload settings from the config file.
//!
//! The new settings replace the current ones wholesale. When loading fails
//! the current settings stay in place.

use anyhow::{Context, Result};
use config::ConfigError;
use log::info;

use crate::config::Settings;
use crate::context::AgentContext;

pub fn run(
    context: &AgentContext,
    load: impl FnOnce() -> Result<Settings, ConfigError>,
) -> Result<()> {
    info!("Starting reload_config job...");

    let settings = load().context("Failed to reload config, keeping current settings")?;
    let pool_count = settings.pools().count();
    context.replace_settings(settings);

    info!(
        "Completed reload_config job ({} protocols, {} pools)",
        context.settings().protocols.len(),
        pool_count
    );
    Ok(())
}
