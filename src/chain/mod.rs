//! Chain module - the network client seam and confirmation tracking
//!
//! This module provides:
//! - The `ChainClient` trait consumed by the transaction lifecycle
//! - An ethers-backed client with multi-RPC failover
//! - Finality waiting with bounded backoff

pub mod backoff;
pub mod finality;
pub mod provider;

#[cfg(test)]
pub mod testing;

pub use backoff::BackoffConfig;
pub use finality::{Confirmation, FinalityWaiter};
pub use provider::EthersClient;

use crate::error::DistributorResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};

/// RPC capabilities the distributor needs from a network node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Confirmed transaction count (next nonce) for an address
    async fn get_transaction_count(&self, address: Address) -> DistributorResult<u64>;

    /// Node's single-sample suggested gas price
    async fn get_gas_price(&self) -> DistributorResult<U256>;

    /// Base fee per gas for `block_count` blocks ending at `end_block`
    async fn base_fee_history(
        &self,
        block_count: u64,
        end_block: u64,
        percentiles: &[f64],
    ) -> DistributorResult<Vec<U256>>;

    /// Current chain head height
    async fn get_block_number(&self) -> DistributorResult<u64>;

    /// Broadcast signed bytes, returning the transaction hash once the node accepts it
    async fn send_raw_transaction(&self, raw: Bytes) -> DistributorResult<H256>;

    fn chain_id(&self) -> u64;
}
