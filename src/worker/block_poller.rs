use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::monitor::{BlockEvent, Finding, RpcChainReader, TransactionEvent};

/// Blocks further behind the tip than this are skipped rather than replayed.
const MAX_CATCH_UP_BLOCKS: u64 = 100;

/// New blocks and their transactions.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    async fn block_transactions(&self, block_number: u64) -> Result<Vec<TransactionEvent>>;
}

#[async_trait]
impl BlockSource for RpcChainReader {
    async fn block_number(&self) -> Result<u64> {
        RpcChainReader::block_number(self).await
    }

    async fn block_transactions(&self, block_number: u64) -> Result<Vec<TransactionEvent>> {
        RpcChainReader::block_transactions(self, block_number).await
    }
}

/// Follows the chain tip and feeds every new block and transaction to the agent.
///
/// Starts at the tip observed on the first poll. A block that fails is
/// retried on the next tick.
pub struct BlockPoller {
    agent: Arc<Agent>,
    source: Arc<dyn BlockSource>,
    poll_interval: Duration,
}

impl BlockPoller {
    pub fn new(agent: Arc<Agent>, source: Arc<dyn BlockSource>, poll_interval: Duration) -> Self {
        Self {
            agent,
            source,
            poll_interval,
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut last_processed: Option<u64> = None;

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Block poller received cancellation signal");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    match self.poll(last_processed).await {
                        Ok(last) => last_processed = last,
                        Err(e) => error!("Failed to poll chain tip: {:#}", e),
                    }
                }
            }
        }

        Ok(())
    }

    /// Processes blocks after `last_processed` up to the current tip and
    /// returns the new last processed block.
    async fn poll(&self, last_processed: Option<u64>) -> Result<Option<u64>> {
        let tip = self.source.block_number().await?;

        let Some(mut last) = last_processed else {
            info!("Block poller starting at block {}", tip);
            if let Err(e) = self.process_and_emit(tip).await {
                error!("Failed to process block {}: {:#}", tip, e);
                return Ok(None);
            }
            return Ok(Some(tip));
        };

        if tip.saturating_sub(last) > MAX_CATCH_UP_BLOCKS {
            let resume = tip - MAX_CATCH_UP_BLOCKS;
            warn!(
                "Block poller is {} blocks behind, skipping to {}",
                tip - last,
                resume
            );
            last = resume;
        }

        for number in last + 1..=tip {
            if let Err(e) = self.process_and_emit(number).await {
                error!("Failed to process block {}: {:#}", number, e);
                break;
            }
            last = number;
        }

        Ok(Some(last))
    }

    async fn process_and_emit(&self, number: u64) -> Result<()> {
        for finding in self.process_block(number).await? {
            emit(&finding);
        }
        Ok(())
    }

    /// Runs the block handler, then the transaction handler for every
    /// transaction in the block. A failing handler is logged and skipped;
    /// only a failure to fetch the block's transactions is returned.
    pub async fn process_block(&self, number: u64) -> Result<Vec<Finding>> {
        let transactions = self.source.block_transactions(number).await?;

        let mut findings = Vec::new();
        match self.agent.handle_block(&BlockEvent { number }).await {
            Ok(block_findings) => findings.extend(block_findings),
            Err(e) => error!("Block handler failed for block {}: {:#}", number, e),
        }

        for tx in &transactions {
            match self.agent.handle_transaction(tx).await {
                Ok(tx_findings) => findings.extend(tx_findings),
                Err(e) => error!("Transaction handler failed for {}: {:#}", tx.hash, e),
            }
        }

        Ok(findings)
    }
}

fn emit(finding: &Finding) {
    match serde_json::to_string(finding) {
        Ok(json) => info!("Finding: {}", json),
        Err(e) => error!("Failed to serialize finding {}: {}", finding.alert_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AgentContext;
    use crate::monitor::{ChainReader, PriceSource};
    use alloy::primitives::{Address, TxHash, U256};
    use std::sync::Mutex;

    struct FakeChain {
        tip: u64,
        fetched: Mutex<Vec<u64>>,
    }

    #[async_trait]
    impl BlockSource for FakeChain {
        async fn block_number(&self) -> Result<u64> {
            Ok(self.tip)
        }

        async fn block_transactions(&self, block_number: u64) -> Result<Vec<TransactionEvent>> {
            self.fetched.lock().unwrap().push(block_number);
            Ok(vec![
                TransactionEvent::new(TxHash::ZERO, block_number, ["0xa"]).with_gas_used(21_000),
                TransactionEvent::new(TxHash::ZERO, block_number, ["0xb"]).with_gas_used(2_000_000),
            ])
        }
    }

    #[async_trait]
    impl ChainReader for FakeChain {
        async fn gas_used(&self, _: TxHash) -> Result<Option<u64>> {
            Ok(None)
        }

        async fn balance_at(&self, _: Address, _: u64) -> Result<U256> {
            Ok(U256::from(1_000_000_000_000_000_000u64))
        }
    }

    #[async_trait]
    impl PriceSource for FakeChain {
        async fn latest_price(&self, _: &str, _: &str, _: &str) -> Result<Option<f64>> {
            Ok(None)
        }
    }

    fn poller(tip: u64) -> (BlockPoller, Arc<FakeChain>) {
        let settings = serde_json::from_value(serde_json::json!({ "protocols": {} })).unwrap();
        let context = Arc::new(AgentContext::new(settings));
        let chain = Arc::new(FakeChain {
            tip,
            fetched: Mutex::new(Vec::new()),
        });
        let agent = Arc::new(Agent::new(context, chain.clone(), chain.clone()));
        (
            BlockPoller::new(agent, chain.clone(), Duration::from_millis(10)),
            chain,
        )
    }

    #[tokio::test]
    async fn test_process_block_collects_transaction_findings() {
        let (poller, _) = poller(1);

        let findings = poller.process_block(1).await.unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].alert_id, "FORTA-1");
    }

    #[tokio::test]
    async fn test_first_poll_starts_at_tip() {
        let (poller, chain) = poller(50);

        let last = poller.poll(None).await.unwrap();

        assert_eq!(last, Some(50));
        assert_eq!(*chain.fetched.lock().unwrap(), vec![50]);
    }

    #[tokio::test]
    async fn test_poll_processes_every_new_block() {
        let (poller, chain) = poller(13);

        let last = poller.poll(Some(10)).await.unwrap();

        assert_eq!(last, Some(13));
        assert_eq!(*chain.fetched.lock().unwrap(), vec![11, 12, 13]);
    }

    #[tokio::test]
    async fn test_poll_skips_ahead_when_far_behind() {
        let (poller, chain) = poller(1_000);

        poller.poll(Some(10)).await.unwrap();

        let fetched = chain.fetched.lock().unwrap();
        assert_eq!(fetched.len() as u64, MAX_CATCH_UP_BLOCKS);
        assert_eq!(fetched.first(), Some(&901));
    }

    #[tokio::test]
    async fn test_run_stops_on_cancellation() {
        let (poller, _) = poller(1);
        let token = CancellationToken::new();
        token.cancel();

        poller.run(token).await.unwrap();
    }
}
