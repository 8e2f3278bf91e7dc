use std::sync::Arc;

use anyhow::Result;
use log::error;

use crate::context::AgentContext;
use crate::monitor::{
    BalanceMonitor, BlockEvent, ChainReader, Finding, GasMonitor, PriceAnomalyMonitor,
    PriceSource, TransactionEvent,
};

/// Event entry points dispatching to the enabled monitors.
///
/// Monitor toggles are read from the current settings on every event, so a
/// config reload takes effect without a restart. Finding caps are fixed at
/// construction and last for the lifetime of the agent. A failing monitor is
/// logged and does not hide the findings of the others.
pub struct Agent {
    context: Arc<AgentContext>,
    price: PriceAnomalyMonitor,
    gas: GasMonitor,
    balance: BalanceMonitor,
}

impl Agent {
    pub fn new(
        context: Arc<AgentContext>,
        prices: Arc<dyn PriceSource>,
        chain: Arc<dyn ChainReader>,
    ) -> Self {
        let max_findings = context.settings().monitors.max_findings;

        Self {
            price: PriceAnomalyMonitor::new(context.clone(), prices, max_findings),
            gas: GasMonitor::new(context.clone(), chain.clone(), max_findings),
            balance: BalanceMonitor::new(context.clone(), chain),
            context,
        }
    }

    pub async fn handle_transaction(&self, event: &TransactionEvent) -> Result<Vec<Finding>> {
        let settings = self.context.settings();
        let mut findings = Vec::new();

        if settings.monitors.price.enabled {
            match self.price.handle_transaction(event).await {
                Ok(price_findings) => findings.extend(price_findings),
                Err(e) => error!("Price monitor failed for {}: {:#}", event.hash, e),
            }
        }
        if settings.monitors.gas.enabled {
            match self.gas.handle_transaction(event).await {
                Ok(gas_findings) => findings.extend(gas_findings),
                Err(e) => error!("Gas monitor failed for {}: {:#}", event.hash, e),
            }
        }

        Ok(findings)
    }

    pub async fn handle_block(&self, event: &BlockEvent) -> Result<Vec<Finding>> {
        if !self.context.settings().monitors.balance.enabled {
            return Ok(Vec::new());
        }
        self.balance.handle_block(event).await
    }
}
