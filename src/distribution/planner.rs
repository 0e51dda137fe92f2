//! Batch planner: one sequential submit-and-wait cycle per batch

use super::call::DistributionCall;
use super::classify::{classify, FailureKind};
use super::recipients::Recipient;
use crate::chain::{ChainClient, Confirmation, FinalityWaiter};
use crate::config::{FinalityConfig, GasConfig};
use crate::error::{DistributorError, DistributorResult};
use crate::tx::{FeeEstimator, NonceSequencer, NonceState, Submitter, TransactionBuilder};

use chrono::Utc;
use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

/// What to send and where
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub contract: Address,
    pub call: DistributionCall,
    pub batch_size: usize,
}

/// How one batch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Confirmed { tx_hash: H256, block: u64 },
    Failed { kind: FailureKind, reason: String },
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Zero-based batch position
    pub index: usize,
    pub recipients: usize,
    pub nonce: Option<u64>,
    pub outcome: BatchOutcome,
}

/// Per-batch results of one run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub batches: Vec<BatchReport>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn confirmed(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| matches!(b.outcome, BatchOutcome::Confirmed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.batches.len() - self.confirmed()
    }
}

struct SettledBatch {
    tx_hash: H256,
    confirmation: Confirmation,
    gas_price: U256,
    latency_secs: f64,
}

/// Drives the transaction lifecycle for every batch of a recipient list
pub struct BatchPlanner {
    sequencer: NonceSequencer,
    fees: FeeEstimator,
    builder: TransactionBuilder,
    submitter: Submitter,
    waiter: FinalityWaiter,
    plan: BatchPlan,
    gas_limit: U256,
    /// Chain the client is connected to
    chain_id: u64,
}

impl BatchPlanner {
    pub fn new(
        client: Arc<dyn ChainClient>,
        builder: TransactionBuilder,
        plan: BatchPlan,
        gas: &GasConfig,
        finality: &FinalityConfig,
    ) -> Self {
        Self {
            chain_id: client.chain_id(),
            sequencer: NonceSequencer::new(client.clone()),
            fees: FeeEstimator::new(client.clone(), gas),
            submitter: Submitter::new(client.clone()),
            waiter: FinalityWaiter::new(
                client,
                finality.confirmation_blocks,
                finality.confirmation_retries,
                finality.backoff(),
            ),
            builder,
            plan,
            gas_limit: U256::from(gas.gas_limit),
        }
    }

    /// Address every batch is signed and sent from
    pub fn sender(&self) -> Address {
        self.builder.address()
    }

    /// Submit every batch in order, waiting for each to settle before the next.
    ///
    /// Rejected, reverted and timed-out batches are logged and skipped. A
    /// transport failure aborts the remaining batches.
    pub async fn run(
        &self,
        nonces: &mut NonceState,
        recipients: &[Recipient],
    ) -> DistributorResult<RunReport> {
        let batch_size = self.plan.batch_size;
        if batch_size == 0 {
            return Err(DistributorError::invalid("batch size must be at least 1"));
        }
        self.plan.call.validate(recipients)?;
        if self.builder.chain_id() != self.chain_id {
            return Err(DistributorError::Config(format!(
                "Wallet signs for chain {} but the client is connected to chain {}",
                self.builder.chain_id(),
                self.chain_id
            )));
        }

        let address = self.sender();
        let total_batches = recipients.len().div_ceil(batch_size);
        info!(
            ?address,
            contract = ?self.plan.contract,
            method = self.plan.call.signature(),
            recipients = recipients.len(),
            batches = total_batches,
            "Starting distribution"
        );

        let mut report = RunReport::default();

        for (index, batch) in recipients.chunks(batch_size).enumerate() {
            let span = info_span!("batch", batch = index + 1, of = total_batches);
            let mut reserved = None;

            let result = self
                .settle(nonces, address, batch, &mut reserved)
                .instrument(span)
                .await;

            let outcome = match result {
                Ok(settled) => {
                    info!(
                        batch = index + 1,
                        ?address,
                        nonce = reserved,
                        tx_hash = ?settled.tx_hash,
                        gas_price = %settled.gas_price,
                        included_at = settled.confirmation.included_at,
                        block = settled.confirmation.confirmed_at,
                        attempts = settled.confirmation.attempts,
                        "Batch confirmed"
                    );
                    crate::metrics::record_batch_confirmed(settled.latency_secs);
                    BatchOutcome::Confirmed {
                        tx_hash: settled.tx_hash,
                        block: settled.confirmation.confirmed_at,
                    }
                }
                Err(err) => {
                    let kind = classify(&err);
                    let nonce = reserved.or_else(|| err.nonce());

                    if kind.rolls_back_nonce() && reserved.is_some() {
                        self.sequencer.rollback(nonces, address);
                    }

                    error!(
                        batch = index + 1,
                        ?address,
                        nonce,
                        kind = kind.as_str(),
                        "Batch failed: {}",
                        err
                    );
                    crate::metrics::record_batch_failed(kind);

                    if kind.aborts_run() {
                        return Err(err);
                    }
                    BatchOutcome::Failed {
                        kind,
                        reason: err.to_string(),
                    }
                }
            };

            report.batches.push(BatchReport {
                index,
                recipients: batch.len(),
                nonce: reserved,
                outcome,
            });
        }

        info!(
            confirmed = report.confirmed(),
            failed = report.failed(),
            "Distribution finished"
        );
        Ok(report)
    }

    async fn settle(
        &self,
        nonces: &mut NonceState,
        address: Address,
        batch: &[Recipient],
        reserved: &mut Option<u64>,
    ) -> DistributorResult<SettledBatch> {
        let nonce = self.sequencer.next(nonces, address).await?;
        *reserved = Some(nonce);

        let gas = self.fees.estimate().await?;
        let payload = self.plan.call.encode(batch);
        let raw = self
            .builder
            .build(nonce, self.plan.contract, payload, gas.price, self.gas_limit)
            .await?;

        info!(
            nonce,
            from = ?address,
            to = ?self.plan.contract,
            recipients = batch.len(),
            "Sending batch"
        );
        let mut pending = self.submitter.submit(nonce, raw).await?;
        let confirmation = self.waiter.wait(address, &mut pending).await?;

        let latency = Utc::now() - pending.submitted_at;
        Ok(SettledBatch {
            tx_hash: pending.tx_hash,
            confirmation,
            gas_price: gas.price,
            latency_secs: latency.num_milliseconds() as f64 / 1000.0,
        })
    }
}
