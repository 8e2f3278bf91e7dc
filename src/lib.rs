pub mod agent;
pub mod config;
pub mod context;
pub mod cron;
pub mod forecast;
pub mod history;
pub mod monitor;
pub mod subgraph;
pub mod worker;

pub use agent::Agent;
pub use config::Settings;
pub use context::{AgentContext, ForecastSnapshot};
pub use cron::CronScheduler;
pub use worker::BlockPoller;
