//! In-memory chain used by planner tests

use super::ChainClient;
use crate::error::{DistributorError, DistributorResult};

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::{keccak256, rlp::Rlp};
use std::collections::HashSet;
use std::sync::Mutex;

/// A single-account chain that mines every accepted transaction at once
pub struct FakeChain {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    tx_count: u64,
    head: u64,
    gas_price: U256,
    base_fees: Option<Vec<U256>>,
    reject_nonces: HashSet<u64>,
    mining: bool,
    transport_down: bool,
    sent: Vec<SentTransaction>,
}

#[derive(Debug, Clone)]
pub struct SentTransaction {
    pub nonce: u64,
    pub to: Option<Address>,
    pub gas_price: Option<U256>,
    pub data: Bytes,
}

impl FakeChain {
    /// Chain whose account already has `tx_count` mined transactions
    pub fn new(tx_count: u64) -> Self {
        Self {
            state: Mutex::new(FakeState {
                tx_count,
                head: 1_000,
                gas_price: U256::from(25_000_000_000u64),
                base_fees: Some(vec![U256::from(20_000_000_000u64)]),
                mining: true,
                ..Default::default()
            }),
        }
    }

    /// Reject the next transaction signed with `nonce` before it reaches the pool
    pub fn reject_once(&self, nonce: u64) {
        self.state.lock().unwrap().reject_nonces.insert(nonce);
    }

    /// Accept transactions without ever mining them
    pub fn stop_mining(&self) {
        self.state.lock().unwrap().mining = false;
    }

    /// Fail every RPC call at the transport level
    pub fn go_offline(&self) {
        self.state.lock().unwrap().transport_down = true;
    }

    pub fn disable_fee_history(&self) {
        self.state.lock().unwrap().base_fees = None;
    }

    pub fn tx_count(&self) -> u64 {
        self.state.lock().unwrap().tx_count
    }

    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state.lock().unwrap().sent.clone()
    }

    fn check_online(state: &FakeState) -> DistributorResult<()> {
        if state.transport_down {
            return Err(DistributorError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn get_transaction_count(&self, _address: Address) -> DistributorResult<u64> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        Ok(state.tx_count)
    }

    async fn get_gas_price(&self) -> DistributorResult<U256> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        Ok(state.gas_price)
    }

    async fn base_fee_history(
        &self,
        _block_count: u64,
        _end_block: u64,
        _percentiles: &[f64],
    ) -> DistributorResult<Vec<U256>> {
        let state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        state
            .base_fees
            .clone()
            .ok_or_else(|| DistributorError::Transport("method not supported".into()))
    }

    async fn get_block_number(&self) -> DistributorResult<u64> {
        let mut state = self.state.lock().unwrap();
        Self::check_online(&state)?;
        // Every observation sees a new block
        state.head += 1;
        Ok(state.head)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> DistributorResult<H256> {
        let mut state = self.state.lock().unwrap();
        Self::check_online(&state)?;

        let (tx, _signature) = TypedTransaction::decode_signed(&Rlp::new(raw.as_ref()))
            .map_err(|e| DistributorError::Rejected(format!("malformed transaction: {}", e)))?;
        let nonce = tx.nonce().map(|n| n.as_u64()).unwrap_or_default();

        if state.reject_nonces.remove(&nonce) {
            return Err(DistributorError::Rejected("transaction underpriced".into()));
        }
        if nonce != state.tx_count {
            return Err(DistributorError::Rejected(format!(
                "invalid nonce: expected {}, got {}",
                state.tx_count, nonce
            )));
        }

        state.sent.push(SentTransaction {
            nonce,
            to: tx.to_addr().copied(),
            gas_price: tx.gas_price(),
            data: tx.data().cloned().unwrap_or_default(),
        });
        if state.mining {
            state.tx_count += 1;
        }

        Ok(H256::from(keccak256(raw.as_ref())))
    }

    fn chain_id(&self) -> u64 {
        114
    }
}
