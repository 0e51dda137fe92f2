//! Gas price estimation from recent base fees

use crate::chain::ChainClient;
use crate::config::GasConfig;
use crate::error::{DistributorError, DistributorResult};

use ethers::types::U256;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a gas price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPriceSource {
    /// Maximum base fee over the recent history window, marked up
    FeeHistory,
    /// Node's single-sample suggestion, marked up
    Fallback,
}

/// A gas price computed for one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPriceSample {
    pub price: U256,
    pub source: GasPriceSource,
    /// Node suggestion fetched during the same estimate
    pub suggested: U256,
}

/// Gas price estimator for distribution transactions
pub struct FeeEstimator {
    client: Arc<dyn ChainClient>,
    /// Blocks in the base-fee window
    history_blocks: u64,
    /// How far behind the head the window ends
    history_lag: u64,
    /// Markup on the history maximum (e.g., 200 = 2x)
    history_markup_percent: u64,
    /// Markup on the fallback suggestion (e.g., 150 = 1.5x)
    fallback_markup_percent: u64,
}

impl FeeEstimator {
    pub fn new(client: Arc<dyn ChainClient>, config: &GasConfig) -> Self {
        Self {
            client,
            history_blocks: config.fee_history_blocks,
            history_lag: config.fee_history_lag,
            history_markup_percent: config.history_markup_percent,
            fallback_markup_percent: config.fallback_markup_percent,
        }
    }

    /// Estimate a gas price for the next transaction.
    ///
    /// Never returns less than the node's current suggestion.
    pub async fn estimate(&self) -> DistributorResult<GasPriceSample> {
        let history = self.history_max_base_fee().await;
        let suggested = self.client.get_gas_price().await?;

        let sample = match history {
            Ok(max_base_fee) => {
                let marked_up = markup(max_base_fee, self.history_markup_percent);
                GasPriceSample {
                    price: marked_up.max(suggested),
                    source: GasPriceSource::FeeHistory,
                    suggested,
                }
            }
            Err(e) => {
                warn!("Fee history unavailable, using gas price fallback: {}", e);
                GasPriceSample {
                    price: markup(suggested, self.fallback_markup_percent).max(suggested),
                    source: GasPriceSource::Fallback,
                    suggested,
                }
            }
        };

        debug!(
            price = %sample.price,
            suggested = %sample.suggested,
            source = ?sample.source,
            "Estimated gas price"
        );
        crate::metrics::record_gas_price(sample.price);
        Ok(sample)
    }

    async fn history_max_base_fee(&self) -> DistributorResult<U256> {
        // Some nodes reject fee history ending at the unfinalized head
        let head = self.client.get_block_number().await?;
        let end_block = head.saturating_sub(self.history_lag);

        let base_fees = self
            .client
            .base_fee_history(self.history_blocks, end_block, &[])
            .await?;

        base_fees
            .into_iter()
            .max()
            .ok_or_else(|| DistributorError::Transport("Empty base fee history".to_string()))
    }
}

fn markup(price: U256, percent: u64) -> U256 {
    price.saturating_mul(U256::from(percent)) / 100
}
