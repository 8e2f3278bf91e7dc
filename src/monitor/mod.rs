//! Transaction and block monitors.
//!
//! - [`price_anomaly`] - deviation of pool prices from their forecast
//! - [`gas`] - high gas usage
//! - [`balance`] - minimum balance of a watched account

pub mod balance;
pub mod chain;
pub mod event;
pub mod finding;
pub mod gas;
pub mod price_anomaly;

pub use balance::BalanceMonitor;
pub use chain::{ChainReader, RpcChainReader};
pub use event::{BlockEvent, TransactionEvent};
pub use finding::{Finding, FindingCounter, FindingSeverity, FindingType};
pub use gas::GasMonitor;
pub use price_anomaly::{classify_deviation, PriceAnomalyMonitor, PriceSource};
