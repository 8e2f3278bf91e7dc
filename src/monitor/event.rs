use alloy::primitives::{Address, TxHash};
use alloy::rpc::types::TransactionReceipt;
use rustc_hash::FxHashSet;

/// A transaction as seen by the monitors.
///
/// `addresses` holds every address the transaction touched (sender,
/// recipient, created contract, log emitters), lowercased.
#[derive(Debug, Clone)]
pub struct TransactionEvent {
    pub hash: TxHash,
    pub block_number: u64,
    pub addresses: FxHashSet<String>,
    /// Gas used, when already known from the receipt
    pub gas_used: Option<u64>,
}

impl TransactionEvent {
    pub fn new<I, S>(hash: TxHash, block_number: u64, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hash,
            block_number,
            addresses: addresses
                .into_iter()
                .map(|a| a.as_ref().to_lowercase())
                .collect(),
            gas_used: None,
        }
    }

    pub fn with_gas_used(mut self, gas_used: u64) -> Self {
        self.gas_used = Some(gas_used);
        self
    }

    /// Builds an event from a mined receipt.
    pub fn from_receipt(receipt: &TransactionReceipt, block_number: u64) -> Self {
        let mut addresses: Vec<Address> = vec![receipt.from];
        addresses.extend(receipt.to);
        addresses.extend(receipt.contract_address);
        addresses.extend(receipt.inner.logs().iter().map(|log| log.address()));

        Self::new(
            receipt.transaction_hash,
            block_number,
            addresses.iter().map(|a| a.to_string()),
        )
        .with_gas_used(receipt.gas_used)
    }

    /// Case-insensitive membership test.
    pub fn involves(&self, address: &str) -> bool {
        self.addresses.contains(&address.to_lowercase())
    }
}

/// A new block as seen by the monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEvent {
    pub number: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_involves_ignores_case() {
        let event = TransactionEvent::new(
            TxHash::ZERO,
            1,
            ["0x8AD599C3A0FF1DE082011EFDDC58F1908EB6E6D8", "0xabc"],
        );

        assert!(event.involves("0x8ad599c3a0ff1de082011efddc58f1908eb6e6d8"));
        assert!(event.involves("0xABC"));
        assert!(!event.involves("0xdef"));
        assert_eq!(event.gas_used, None);
    }
}
