//! Chain client with multi-RPC support and automatic failover

use super::ChainClient;
use crate::error::{DistributorError, DistributorResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::{Address, BlockNumber, Bytes, H256, U256};
use ethers::utils::keccak256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Node responses meaning the exact same signed bytes are already pooled
const ALREADY_KNOWN: &[&str] = &["already known", "known transaction"];

/// Retry a read call against each provider in turn until one succeeds
macro_rules! with_failover {
    ($self:ident, $what:expr, |$provider:ident| $call:expr) => {{
        let mut attempts = 0;
        loop {
            let $provider = $self.http();
            match $call.await {
                Ok(value) => break Ok(value),
                Err(e) => {
                    attempts += 1;
                    warn!(
                        "Failed to {} on chain {}: {}",
                        $what, $self.chain_id, e
                    );
                    $self.failover();
                    if attempts >= $self.http_providers.len() {
                        break Err(DistributorError::Transport(format!(
                            "All providers failed to {}: {}",
                            $what, e
                        )));
                    }
                }
            }
        }
    }};
}

/// Multi-provider wrapper with automatic failover
pub struct EthersClient {
    /// Expected chain ID
    chain_id: u64,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl EthersClient {
    /// Create a client over the given endpoints, tried in order
    pub fn new(chain_id: u64, rpc_urls: &[String]) -> DistributorResult<Self> {
        let mut http_providers = Vec::new();

        for url in rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(DistributorError::Config(format!(
                "No valid RPC providers for chain {}",
                chain_id
            )));
        }

        Ok(Self {
            chain_id,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Create a client and verify the node serves the expected chain
    pub async fn connect(chain_id: u64, rpc_urls: &[String]) -> DistributorResult<Self> {
        let client = Self::new(chain_id, rpc_urls)?;

        let reported: U256 = with_failover!(client, "get chain id", |p| p.get_chainid())?;
        if reported != U256::from(chain_id) {
            return Err(DistributorError::Config(format!(
                "RPC reports chain id {}, expected {}",
                reported, chain_id
            )));
        }

        info!("Connected to chain {}", chain_id);
        Ok(client)
    }

    /// Get the active HTTP provider
    fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        if self.http_providers.len() < 2 {
            return;
        }
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!("Chain {} failover to provider {}", self.chain_id, next);
    }
}

#[async_trait]
impl ChainClient for EthersClient {
    async fn get_transaction_count(&self, address: Address) -> DistributorResult<u64> {
        let count: U256 = with_failover!(self, "get transaction count", |p| p
            .get_transaction_count(address, None))?;
        Ok(count.low_u64())
    }

    async fn get_gas_price(&self) -> DistributorResult<U256> {
        with_failover!(self, "get gas price", |p| p.get_gas_price())
    }

    async fn base_fee_history(
        &self,
        block_count: u64,
        end_block: u64,
        percentiles: &[f64],
    ) -> DistributorResult<Vec<U256>> {
        let history = with_failover!(self, "get fee history", |p| p.fee_history(
            block_count,
            BlockNumber::Number(end_block.into()),
            percentiles
        ))?;
        Ok(history.base_fee_per_gas)
    }

    async fn get_block_number(&self) -> DistributorResult<u64> {
        let block = with_failover!(self, "get block number", |p| p.get_block_number())?;
        Ok(block.as_u64())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> DistributorResult<H256> {
        let mut last_error = String::new();

        for _ in 0..self.http_providers.len() {
            match self.http().send_raw_transaction(raw.clone()).await {
                Ok(pending) => return Ok(pending.tx_hash()),
                Err(e) => {
                    if let Some(outcome) = rejection(&e, &raw) {
                        return outcome;
                    }
                    warn!(
                        "Failed to send transaction on chain {}: {}",
                        self.chain_id, e
                    );
                    last_error = e.to_string();
                    self.failover();
                }
            }
        }

        Err(DistributorError::Transport(format!(
            "All providers failed to send transaction: {}",
            last_error
        )))
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

/// Interpret a JSON-RPC error response to a send.
///
/// Returns `None` for transport-level failures, which are worth retrying on
/// another provider.
fn rejection(error: &ProviderError, raw: &Bytes) -> Option<DistributorResult<H256>> {
    let response = error.as_error_response()?;
    let message = response.message.to_lowercase();

    if ALREADY_KNOWN.iter().any(|known| message.contains(known)) {
        debug!("Node already holds transaction: {}", response.message);
        return Some(Ok(H256::from(keccak256(raw.as_ref()))));
    }

    Some(Err(DistributorError::Rejected(format!(
        "{} (code {})",
        response.message, response.code
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::providers::{HttpClientError, JsonRpcError};

    fn node_error(code: i64, message: &str) -> ProviderError {
        ProviderError::JsonRpcClientError(Box::new(HttpClientError::JsonRpcError(JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        })))
    }

    #[test]
    fn test_node_rejection_maps_to_rejected() {
        let raw = Bytes::from(vec![0xf8, 0x6b]);
        match rejection(&node_error(-32000, "nonce too low"), &raw) {
            Some(Err(DistributorError::Rejected(message))) => {
                assert_eq!(message, "nonce too low (code -32000)");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_already_known_counts_as_accepted() {
        let raw = Bytes::from(vec![0xf8, 0x6b, 0x01]);
        for message in ["already known", "Known transaction: 0xabc"] {
            let outcome = rejection(&node_error(-32000, message), &raw);
            assert_eq!(
                outcome.map(|r| r.ok()),
                Some(Some(H256::from(keccak256(raw.as_ref()))))
            );
        }
    }

    #[test]
    fn test_transport_failure_is_not_a_rejection() {
        let raw = Bytes::from(vec![0x01]);
        let error = ProviderError::CustomError("connection reset by peer".to_string());
        assert!(rejection(&error, &raw).is_none());
    }

    #[test]
    fn test_rejects_empty_url_list() {
        let result = EthersClient::new(14, &[]);
        assert!(matches!(result, Err(DistributorError::Config(_))));
    }

    #[test]
    fn test_skips_unparseable_urls() {
        let urls = vec![
            "not a url".to_string(),
            "http://localhost:8545".to_string(),
        ];
        let client = EthersClient::new(114, &urls).unwrap();
        assert_eq!(client.http_providers.len(), 1);
        assert_eq!(client.chain_id(), 114);
    }

    #[test]
    fn test_failover_rotates_providers() {
        let urls = vec![
            "http://localhost:8545".to_string(),
            "http://localhost:8546".to_string(),
        ];
        let client = EthersClient::new(114, &urls).unwrap();
        client.failover();
        assert_eq!(client.current_provider.load(Ordering::Relaxed), 1);
        client.failover();
        assert_eq!(client.current_provider.load(Ordering::Relaxed), 0);
    }
}
