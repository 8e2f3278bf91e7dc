use alloy::eips::BlockId;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

use super::event::TransactionEvent;

/// Chain lookups needed by the threshold monitors.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Gas used by a mined transaction; `None` if the receipt is unknown.
    async fn gas_used(&self, tx_hash: TxHash) -> Result<Option<u64>>;

    /// Account balance in wei at the given block.
    async fn balance_at(&self, account: Address, block_number: u64) -> Result<U256>;
}

/// JSON-RPC backed chain access.
#[derive(Clone)]
pub struct RpcChainReader {
    provider: DynProvider,
}

impl RpcChainReader {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url = Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL {}", rpc_url))?;
        let client = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            provider: DynProvider::new(client),
        })
    }

    pub async fn block_number(&self) -> Result<u64> {
        self.provider
            .get_block_number()
            .await
            .context("Failed to fetch block number")
    }

    /// Transaction events for every receipt in a block.
    pub async fn block_transactions(&self, block_number: u64) -> Result<Vec<TransactionEvent>> {
        let receipts = self
            .provider
            .get_block_receipts(BlockId::number(block_number))
            .await
            .with_context(|| format!("Failed to fetch receipts for block {}", block_number))?
            .unwrap_or_default();

        Ok(receipts
            .iter()
            .map(|receipt| TransactionEvent::from_receipt(receipt, block_number))
            .collect())
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn gas_used(&self, tx_hash: TxHash) -> Result<Option<u64>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .with_context(|| format!("Failed to fetch receipt for {}", tx_hash))?;

        Ok(receipt.map(|r| r.gas_used))
    }

    async fn balance_at(&self, account: Address, block_number: u64) -> Result<U256> {
        self.provider
            .get_balance(account)
            .block_id(BlockId::number(block_number))
            .await
            .with_context(|| format!("Failed to fetch balance of {}", account))
    }
}
