//! Transaction submission

use crate::chain::ChainClient;
use crate::error::{DistributorError, DistributorResult};

use chrono::{DateTime, Utc};
use ethers::types::{Bytes, H256};
use std::sync::Arc;
use tracing::{info, warn};

/// Lifecycle of a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepted into the node's pool
    Submitted,
    /// Observed mined at `block`
    Included { block: u64 },
    /// Survived the confirmation depth, observed at `block`
    Confirmed { block: u64 },
    /// Dropped by reorgs after the retry budget
    Reverted,
}

/// A transaction the node has accepted, tracked until it settles
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub tx_hash: H256,
    pub nonce: u64,
    pub submitted_at: DateTime<Utc>,
    pub status: TransactionStatus,
}

/// Sends signed transactions into the network's pending pool
pub struct Submitter {
    client: Arc<dyn ChainClient>,
}

impl Submitter {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    /// Broadcast `raw`, signed with `nonce`.
    ///
    /// A node rejection becomes `SubmissionRejected`: the nonce was never
    /// consumed and the caller must roll it back.
    pub async fn submit(&self, nonce: u64, raw: Bytes) -> DistributorResult<PendingTransaction> {
        let size = raw.len();
        let tx_hash = match self.client.send_raw_transaction(raw).await {
            Ok(hash) => hash,
            Err(DistributorError::Rejected(message)) => {
                warn!(nonce, %message, "Transaction rejected before pool acceptance");
                return Err(DistributorError::SubmissionRejected { nonce, message });
            }
            Err(e) => return Err(e),
        };

        info!(
            nonce,
            size,
            "Transaction sent: 0x{}",
            hex::encode(tx_hash)
        );
        crate::metrics::record_tx_submitted();

        Ok(PendingTransaction {
            tx_hash,
            nonce,
            submitted_at: Utc::now(),
            status: TransactionStatus::Submitted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;

    #[tokio::test]
    async fn test_accepted_submission_is_pending() {
        let mut mock = MockChainClient::new();
        mock.expect_send_raw_transaction()
            .times(1)
            .returning(|_| Ok(H256::repeat_byte(7)));

        let submitter = Submitter::new(Arc::new(mock));
        let pending = submitter.submit(12, Bytes::from(vec![1, 2, 3])).await.unwrap();

        assert_eq!(pending.nonce, 12);
        assert_eq!(pending.tx_hash, H256::repeat_byte(7));
        assert_eq!(pending.status, TransactionStatus::Submitted);
    }

    #[tokio::test]
    async fn test_rejection_carries_nonce() {
        let mut mock = MockChainClient::new();
        mock.expect_send_raw_transaction()
            .returning(|_| Err(DistributorError::Rejected("nonce too low".into())));

        let submitter = Submitter::new(Arc::new(mock));
        let err = submitter.submit(4, Bytes::new()).await.unwrap_err();

        match err {
            DistributorError::SubmissionRejected { nonce, message } => {
                assert_eq!(nonce, 4);
                assert_eq!(message, "nonce too low");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_passes_through() {
        let mut mock = MockChainClient::new();
        mock.expect_send_raw_transaction()
            .returning(|_| Err(DistributorError::Transport("connection refused".into())));

        let submitter = Submitter::new(Arc::new(mock));
        let err = submitter.submit(4, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, DistributorError::Transport(_)));
    }
}
