//! Contract call encoding for reward batches

use super::recipients::Recipient;
use crate::error::{DistributorError, DistributorResult};

use ethers::abi::{encode, Token};
use ethers::types::{Bytes, U256};
use ethers::utils::id;

const DISTRIBUTE: &str = "distribute(address[],uint256[])";
const DISTRIBUTE_REWARDS: &str = "distributeRewards(uint256,uint256,address[],uint128[])";

/// Contract method a batch is sent as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionCall {
    /// `Dist.distribute(recipients, amounts)`
    Dist,
    /// `RNat.distributeRewards(projectId, month, recipients, amounts)`
    RNat { project_id: u64, month: u64 },
}

impl DistributionCall {
    pub fn signature(&self) -> &'static str {
        match self {
            DistributionCall::Dist => DISTRIBUTE,
            DistributionCall::RNat { .. } => DISTRIBUTE_REWARDS,
        }
    }

    /// Check every amount fits the method's amount type
    pub fn validate(&self, recipients: &[Recipient]) -> DistributorResult<()> {
        if let DistributionCall::RNat { .. } = self {
            let limit = U256::from(u128::MAX);
            if let Some(index) = recipients.iter().position(|r| r.amount > limit) {
                return Err(DistributorError::Validation {
                    row: index + 1,
                    message: "amount does not fit in uint128".to_string(),
                });
            }
        }
        Ok(())
    }

    /// ABI-encode calldata for one batch
    pub fn encode(&self, batch: &[Recipient]) -> Bytes {
        let addresses = Token::Array(batch.iter().map(|r| Token::Address(r.address)).collect());
        let amounts = Token::Array(batch.iter().map(|r| Token::Uint(r.amount)).collect());

        let args = match self {
            DistributionCall::Dist => vec![addresses, amounts],
            DistributionCall::RNat { project_id, month } => vec![
                Token::Uint(U256::from(*project_id)),
                Token::Uint(U256::from(*month)),
                addresses,
                amounts,
            ],
        };

        let mut data = id(self.signature()).to_vec();
        data.extend(encode(&args));
        Bytes::from(data)
    }
}
