use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};

use crate::context::AgentContext;

use super::chain::ChainReader;
use super::event::BlockEvent;
use super::finding::{Finding, FindingSeverity, FindingType};

pub const ALERT_ID: &str = "FORTA-6";

/// Reports when the watched account drops below its minimum balance.
pub struct BalanceMonitor {
    context: Arc<AgentContext>,
    chain: Arc<dyn ChainReader>,
}

impl BalanceMonitor {
    pub fn new(context: Arc<AgentContext>, chain: Arc<dyn ChainReader>) -> Self {
        Self { context, chain }
    }

    pub async fn handle_block(&self, event: &BlockEvent) -> Result<Vec<Finding>> {
        let settings = self.context.settings();
        let watched = &settings.monitors.balance;

        let account: Address = watched
            .account
            .parse()
            .with_context(|| format!("Invalid watched account {}", watched.account))?;
        let minimum = U256::from(watched.min_balance_wei);

        let balance = self.chain.balance_at(account, event.number).await?;
        if balance >= minimum {
            return Ok(Vec::new());
        }

        Ok(vec![Finding::new(
            "Minimum Account Balance",
            format!(
                "Account balance ({}) below threshold ({})",
                balance, minimum
            ),
            ALERT_ID,
            FindingSeverity::Info,
            FindingType::Suspicious,
        )
        .with_metadata("account", &watched.account)
        .with_metadata("balance", balance)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::TxHash;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedBalance {
        balance: U256,
        queried: Mutex<Vec<(Address, u64)>>,
    }

    #[async_trait]
    impl ChainReader for FixedBalance {
        async fn gas_used(&self, _: TxHash) -> Result<Option<u64>> {
            Ok(None)
        }

        async fn balance_at(&self, account: Address, block_number: u64) -> Result<U256> {
            self.queried.lock().unwrap().push((account, block_number));
            Ok(self.balance)
        }
    }

    fn monitor(balance_wei: u64) -> (BalanceMonitor, Arc<FixedBalance>) {
        let settings = serde_json::from_value(serde_json::json!({ "protocols": {} })).unwrap();
        let chain = Arc::new(FixedBalance {
            balance: U256::from(balance_wei),
            queried: Mutex::new(Vec::new()),
        });
        (
            BalanceMonitor::new(Arc::new(AgentContext::new(settings)), chain.clone()),
            chain,
        )
    }

    #[tokio::test]
    async fn test_balance_at_minimum_is_fine() {
        let (monitor, chain) = monitor(500_000_000_000_000_000);

        let findings = monitor.handle_block(&BlockEvent { number: 17 }).await.unwrap();

        assert!(findings.is_empty());
        let queried = chain.queried.lock().unwrap();
        assert_eq!(queried.len(), 1);
        assert_eq!(queried[0].1, 17);
        assert_eq!(
            queried[0].0,
            "0x6efef34e81fd201edf18c7902948168e9ebb88ae"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_low_balance_emits_info() {
        let (monitor, _) = monitor(1_000);

        let findings = monitor.handle_block(&BlockEvent { number: 1 }).await.unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, FindingSeverity::Info);
        assert_eq!(findings[0].alert_id, ALERT_ID);
        assert_eq!(
            findings[0].description,
            "Account balance (1000) below threshold (500000000000000000)"
        );
        assert_eq!(findings[0].metadata["balance"], "1000");
    }
}
