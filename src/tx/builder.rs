//! Transaction assembly and signing

use crate::error::{DistributorError, DistributorResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};

/// Builds and signs legacy EIP-155 transactions with the run's single wallet
pub struct TransactionBuilder {
    wallet: LocalWallet,
}

impl TransactionBuilder {
    /// Bind `wallet` to `chain_id` so every signature is replay-protected
    pub fn new(wallet: LocalWallet, chain_id: u64) -> Self {
        Self {
            wallet: wallet.with_chain_id(chain_id),
        }
    }

    /// Parse a hex private key, with or without a `0x` prefix
    pub fn from_private_key(key: &str, chain_id: u64) -> DistributorResult<Self> {
        let wallet = key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| DistributorError::Signing(format!("Invalid private key: {}", e)))?;
        Ok(Self::new(wallet, chain_id))
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Chain id every signature is bound to
    pub fn chain_id(&self) -> u64 {
        self.wallet.chain_id()
    }

    /// Assemble and sign a transaction, returning the raw RLP bytes
    pub async fn build(
        &self,
        nonce: u64,
        destination: Address,
        payload: Bytes,
        gas_price: U256,
        gas_limit: U256,
    ) -> DistributorResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.wallet.address())
            .to(destination)
            .data(payload)
            .nonce(nonce)
            .gas(gas_limit)
            .gas_price(gas_price)
            .chain_id(self.wallet.chain_id())
            .into();

        let signature = self
            .wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| DistributorError::Signing(e.to_string()))?;

        Ok(tx.rlp_signed(&signature))
    }
}
