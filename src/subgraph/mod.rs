//! Subgraph access for daily pool prices.
//!
//! - [`client`] - GraphQL client with transport retries over a pluggable transport
//! - [`uniswap`] - Uniswap V3 `poolDayDatas` queries
//! - [`fetcher`] - history refresh and latest-price lookups per protocol

pub mod client;
pub mod fetcher;
pub mod uniswap;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{GraphQlTransport, HttpTransport, SubgraphClient};
pub use fetcher::{PoolDataFetcher, Protocol, SubgraphPriceSource};
