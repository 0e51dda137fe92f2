//! Nonce management for sequential transaction submission
//!
//! Nonces are reserved optimistically: `next` hands out the stored value and
//! bumps it before the transaction is confirmed, so the next batch can be
//! built without re-querying the node. `rollback` returns the most recent
//! reservation when a submission is known to have failed before occupying
//! its slot on chain.

use crate::chain::ChainClient;
use crate::error::DistributorResult;

use ethers::types::Address;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Next nonce to use, per signing address
#[derive(Debug, Default)]
pub struct NonceState {
    next: HashMap<Address, u64>,
}

impl NonceState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Issues and rolls back nonces against a caller-owned `NonceState`
pub struct NonceSequencer {
    client: Arc<dyn ChainClient>,
}

impl NonceSequencer {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    /// Reserve the next nonce for `address`.
    ///
    /// The first call for an address seeds the entry from the network's
    /// transaction count.
    pub async fn next(&self, state: &mut NonceState, address: Address) -> DistributorResult<u64> {
        let nonce = match state.next.get(&address) {
            Some(&stored) => stored,
            None => {
                let on_chain = self.client.get_transaction_count(address).await?;
                debug!(?address, nonce = on_chain, "Initialized nonce from chain");
                on_chain
            }
        };

        state.next.insert(address, nonce + 1);
        debug!(?address, nonce, "Allocated nonce");
        Ok(nonce)
    }

    /// Release the most recently issued nonce. No-op for unknown addresses.
    pub fn rollback(&self, state: &mut NonceState, address: Address) {
        match state.next.get_mut(&address) {
            Some(next) if *next > 0 => {
                *next -= 1;
                crate::metrics::record_nonce_rollback();
                debug!(?address, next = *next, "Rolled back nonce");
            }
            Some(_) => warn!(?address, "Nonce rollback below zero ignored"),
            None => {}
        }
    }

    /// Stored next nonce, without reserving it
    #[cfg(test)]
    pub fn peek(&self, state: &NonceState, address: Address) -> Option<u64> {
        state.next.get(&address).copied()
    }
}
