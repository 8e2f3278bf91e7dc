use std::sync::Arc;

use anyhow::Result;

use crate::config::GasMonitorSettings;
use crate::context::AgentContext;

use super::chain::ChainReader;
use super::event::TransactionEvent;
use super::finding::{Finding, FindingCounter, FindingSeverity, FindingType};

pub const ALERT_ID: &str = "FORTA-1";

/// Severity for a gas usage at or above the medium threshold.
pub fn gas_severity(gas_used: u64, thresholds: &GasMonitorSettings) -> FindingSeverity {
    if gas_used > thresholds.critical_threshold {
        FindingSeverity::Critical
    } else if gas_used > thresholds.high_threshold {
        FindingSeverity::High
    } else {
        FindingSeverity::Medium
    }
}

/// Flags transactions with high gas usage, capped per process lifetime.
pub struct GasMonitor {
    context: Arc<AgentContext>,
    chain: Arc<dyn ChainReader>,
    counter: FindingCounter,
}

impl GasMonitor {
    pub fn new(context: Arc<AgentContext>, chain: Arc<dyn ChainReader>, max_findings: usize) -> Self {
        Self {
            context,
            chain,
            counter: FindingCounter::new(max_findings),
        }
    }

    pub async fn handle_transaction(&self, event: &TransactionEvent) -> Result<Vec<Finding>> {
        if self.counter.is_exhausted() {
            return Ok(Vec::new());
        }

        let gas_used = match event.gas_used {
            Some(gas_used) => gas_used,
            None => match self.chain.gas_used(event.hash).await? {
                Some(gas_used) => gas_used,
                None => return Ok(Vec::new()),
            },
        };

        let settings = self.context.settings();
        let thresholds = &settings.monitors.gas;
        if gas_used < thresholds.medium_threshold || !self.counter.try_acquire() {
            return Ok(Vec::new());
        }

        Ok(vec![Finding::new(
            "High Gas Used",
            format!("Gas Used: {}", gas_used),
            ALERT_ID,
            gas_severity(gas_used, thresholds),
            FindingType::Suspicious,
        )
        .with_metadata("gas_used", gas_used)])
    }
}
