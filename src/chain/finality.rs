//! Finality waiting for submitted transactions
//!
//! A transaction moves `Submitted → Included → Confirmed`, or ends `Reverted`
//! once it has been dropped by reorgs more times than the retry budget allows.
//! Inclusion is inferred from the sender's transaction count: nonces are
//! sequential and exclusively owned by this run's account, so a count above
//! the used nonce means that nonce was mined.

use super::backoff::{Backoff, BackoffConfig};
use super::ChainClient;
use crate::error::{DistributorError, DistributorResult};
use crate::tx::{PendingTransaction, TransactionStatus};

use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Head height the final depth wait counted from
    pub included_at: u64,
    /// Head height when the confirmation depth was reached
    pub confirmed_at: u64,
    /// Depth waits run, counting reorg retries
    pub attempts: u32,
}

/// Waits for transactions to be included and buried under enough blocks
pub struct FinalityWaiter {
    client: Arc<dyn ChainClient>,
    /// Extra blocks required past the inclusion point
    confirmation_blocks: u64,
    /// Depth waits before a dropped transaction counts as reverted
    confirmation_retries: u32,
    backoff: BackoffConfig,
}

impl FinalityWaiter {
    pub fn new(
        client: Arc<dyn ChainClient>,
        confirmation_blocks: u64,
        confirmation_retries: u32,
        backoff: BackoffConfig,
    ) -> Self {
        Self {
            client,
            confirmation_blocks,
            confirmation_retries: confirmation_retries.max(1),
            backoff,
        }
    }

    /// Block until `pending` is confirmed, updating its status along the way.
    ///
    /// Inclusion is awaited once. A transaction that falls out of the chain
    /// after that only gets the depth wait and count re-check repeated, and
    /// ends `Reverted` once the retries are spent.
    pub async fn wait(
        &self,
        address: Address,
        pending: &mut PendingTransaction,
    ) -> DistributorResult<Confirmation> {
        let nonce = pending.nonce;

        self.wait_for_inclusion(address, nonce).await?;
        let mut included_at = self.client.get_block_number().await?;
        pending.status = TransactionStatus::Included { block: included_at };
        debug!(?address, nonce, block = included_at, "Transaction included");

        let mut attempts = 0;
        loop {
            attempts += 1;

            let confirmed_at = self.wait_for_depth(nonce, included_at).await?;

            let count = self.client.get_transaction_count(address).await?;
            if count > nonce {
                pending.status = TransactionStatus::Confirmed {
                    block: confirmed_at,
                };
                info!(
                    ?address,
                    nonce,
                    tx_hash = ?pending.tx_hash,
                    confirmations = confirmed_at.saturating_sub(included_at),
                    attempt = attempts,
                    "Transaction confirmed"
                );
                return Ok(Confirmation {
                    included_at,
                    confirmed_at,
                    attempts,
                });
            }

            warn!(
                ?address,
                nonce,
                count,
                attempt = attempts,
                "Transaction dropped by reorg"
            );

            if attempts >= self.confirmation_retries {
                pending.status = TransactionStatus::Reverted;
                return Err(DistributorError::RevertedOnChain { nonce, attempts });
            }
            pending.status = TransactionStatus::Submitted;
            included_at = self.client.get_block_number().await?;
        }
    }

    /// Poll the transaction count until it passes `nonce`
    async fn wait_for_inclusion(&self, address: Address, nonce: u64) -> DistributorResult<u64> {
        let mut backoff = Backoff::new(self.backoff.clone());

        loop {
            let count = self.client.get_transaction_count(address).await?;
            if count > nonce {
                return Ok(count);
            }

            if !backoff.wait().await {
                warn!(?address, nonce, "Response timeout waiting for inclusion");
                return Err(DistributorError::FinalizationTimeout {
                    nonce,
                    escalations: backoff.escalations(),
                });
            }
        }
    }

    /// Poll the head until it is `confirmation_blocks` past `included_at`.
    ///
    /// The backoff budget restarts whenever the head advances, so only a
    /// stalled head times out.
    async fn wait_for_depth(&self, nonce: u64, included_at: u64) -> DistributorResult<u64> {
        let target = included_at.saturating_add(self.confirmation_blocks);
        let mut backoff = Backoff::new(self.backoff.clone());
        let mut last_head = included_at;

        loop {
            let head = self.client.get_block_number().await?;
            if head >= target {
                return Ok(head);
            }

            if head > last_head {
                last_head = head;
                backoff.reset();
            }

            if !backoff.wait().await {
                warn!(nonce, head, target, "Chain head stalled while waiting for confirmations");
                return Err(DistributorError::FinalizationTimeout {
                    nonce,
                    escalations: backoff.escalations(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MockChainClient;
    use chrono::Utc;
    use ethers::types::H256;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    fn backoff() -> BackoffConfig {
        BackoffConfig {
            base_delay: Duration::from_millis(1),
            factor: 1.5,
            max_escalations: 8,
            max_elapsed: None,
        }
    }

    fn pending(nonce: u64) -> PendingTransaction {
        PendingTransaction {
            tx_hash: H256::repeat_byte(0xab),
            nonce,
            submitted_at: Utc::now(),
            status: TransactionStatus::Submitted,
        }
    }

    /// Serve scripted values, repeating the last one when the script runs out
    fn scripted(values: Vec<u64>) -> impl Fn() -> u64 + Send + 'static {
        let queue = Mutex::new(VecDeque::from(values));
        move || {
            let mut queue = queue.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                *queue.front().unwrap()
            }
        }
    }

    #[tokio::test]
    async fn test_confirms_after_depth() {
        let mut mock = MockChainClient::new();
        let counts = scripted(vec![5, 5, 6]);
        mock.expect_get_transaction_count()
            .returning(move |_| Ok(counts()));
        let heads = scripted(vec![100, 100, 101, 102]);
        mock.expect_get_block_number().returning(move || Ok(heads()));

        let waiter = FinalityWaiter::new(Arc::new(mock), 2, 3, backoff());
        let mut tx = pending(5);
        let confirmation = waiter.wait(Address::zero(), &mut tx).await.unwrap();

        assert_eq!(confirmation.included_at, 100);
        assert_eq!(confirmation.confirmed_at, 102);
        assert_eq!(confirmation.attempts, 1);
        assert_eq!(tx.status, TransactionStatus::Confirmed { block: 102 });
    }

    #[tokio::test]
    async fn test_times_out_after_eight_escalations() {
        let mut mock = MockChainClient::new();
        // One initial poll plus one per escalation
        mock.expect_get_transaction_count()
            .times(9)
            .returning(|_| Ok(5));
        mock.expect_get_block_number().never();

        let waiter = FinalityWaiter::new(Arc::new(mock), 2, 3, backoff());
        let mut tx = pending(5);
        let err = waiter.wait(Address::zero(), &mut tx).await.unwrap_err();

        assert!(matches!(
            err,
            DistributorError::FinalizationTimeout {
                nonce: 5,
                escalations: 8
            }
        ));
        assert_eq!(tx.status, TransactionStatus::Submitted);
    }

    #[tokio::test]
    async fn test_stalled_head_times_out() {
        let mut mock = MockChainClient::new();
        mock.expect_get_transaction_count().returning(|_| Ok(1));
        mock.expect_get_block_number().returning(|| Ok(40));

        let waiter = FinalityWaiter::new(Arc::new(mock), 3, 3, backoff());
        let mut tx = pending(0);
        let err = waiter.wait(Address::zero(), &mut tx).await.unwrap_err();

        assert!(matches!(err, DistributorError::FinalizationTimeout { nonce: 0, .. }));
        assert_eq!(tx.status, TransactionStatus::Included { block: 40 });
    }

    #[tokio::test]
    async fn test_slow_head_does_not_time_out() {
        let mut mock = MockChainClient::new();
        mock.expect_get_transaction_count().returning(|_| Ok(1));
        // Head moves one block every seven polls: slower than the budget
        // allows without the reset, but never stalled.
        let mut script = vec![10];
        for block in 10..=20 {
            script.extend(std::iter::repeat(block).take(7));
        }
        let heads = scripted(script);
        mock.expect_get_block_number().returning(move || Ok(heads()));

        let waiter = FinalityWaiter::new(
            Arc::new(mock),
            10,
            3,
            BackoffConfig {
                max_escalations: 7,
                ..backoff()
            },
        );
        let mut tx = pending(0);
        let confirmation = waiter.wait(Address::zero(), &mut tx).await.unwrap();
        assert_eq!(confirmation.confirmed_at, 20);
    }

    #[tokio::test]
    async fn test_reorg_then_confirm() {
        let mut mock = MockChainClient::new();
        // included, dropped on re-check, re-included, holds
        let counts = scripted(vec![4, 3, 4, 4]);
        mock.expect_get_transaction_count()
            .returning(move |_| Ok(counts()));
        let heads = scripted(vec![50, 51, 52, 53]);
        mock.expect_get_block_number().returning(move || Ok(heads()));

        let waiter = FinalityWaiter::new(Arc::new(mock), 1, 3, backoff());
        let mut tx = pending(3);
        let confirmation = waiter.wait(Address::zero(), &mut tx).await.unwrap();

        assert_eq!(confirmation.attempts, 2);
        assert_eq!(confirmation.included_at, 52);
        assert!(matches!(tx.status, TransactionStatus::Confirmed { .. }));
    }

    #[tokio::test]
    async fn test_dropped_and_never_remined_reverts() {
        let mut mock = MockChainClient::new();
        // Mined once, then reorganized out for good
        let counts = scripted(vec![6, 5]);
        mock.expect_get_transaction_count()
            .returning(move |_| Ok(counts()));
        let heads = scripted((100..200).collect());
        mock.expect_get_block_number().returning(move || Ok(heads()));

        let waiter = FinalityWaiter::new(Arc::new(mock), 1, 3, backoff());
        let mut tx = pending(5);
        let err = waiter.wait(Address::zero(), &mut tx).await.unwrap_err();

        assert!(matches!(
            err,
            DistributorError::RevertedOnChain {
                nonce: 5,
                attempts: 3
            }
        ));
        assert_eq!(tx.status, TransactionStatus::Reverted);
    }

    #[tokio::test]
    async fn test_zero_depth_still_rechecks() {
        let mut mock = MockChainClient::new();
        let counts = scripted(vec![8, 7]);
        mock.expect_get_transaction_count()
            .times(4)
            .returning(move |_| Ok(counts()));
        let heads = scripted((0..20).collect());
        mock.expect_get_block_number().returning(move || Ok(heads()));

        let waiter = FinalityWaiter::new(Arc::new(mock), 0, 3, backoff());
        let mut tx = pending(7);
        let err = waiter.wait(Address::zero(), &mut tx).await.unwrap_err();

        assert!(matches!(err, DistributorError::RevertedOnChain { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let mut mock = MockChainClient::new();
        mock.expect_get_transaction_count()
            .returning(|_| Err(DistributorError::Transport("connection refused".into())));

        let waiter = FinalityWaiter::new(Arc::new(mock), 1, 3, backoff());
        let mut tx = pending(0);
        let err = waiter.wait(Address::zero(), &mut tx).await.unwrap_err();
        assert!(matches!(err, DistributorError::Transport(_)));
    }
}
