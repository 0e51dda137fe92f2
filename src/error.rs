//! Error types for the reward distributor

use thiserror::Error;

/// Main error type for the distributor
#[derive(Error, Debug)]
pub enum DistributorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error at row {row}: {message}")]
    Validation { row: usize, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Node rejected request: {0}")]
    Rejected(String),

    #[error("Transaction with nonce {nonce} rejected by node: {message}")]
    SubmissionRejected { nonce: u64, message: String },

    #[error("Transaction with nonce {nonce} dropped from chain after {attempts} confirmation attempts")]
    RevertedOnChain { nonce: u64, attempts: u32 },

    #[error("Timeout waiting for nonce {nonce} after {escalations} backoff escalations")]
    FinalizationTimeout { nonce: u64, escalations: u32 },

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DistributorError {
    /// Validation error that is not tied to a specific input row
    pub fn invalid(message: impl Into<String>) -> Self {
        DistributorError::Validation {
            row: 0,
            message: message.into(),
        }
    }

    /// Nonce carried by the error, if the failure happened after reservation
    pub fn nonce(&self) -> Option<u64> {
        match self {
            DistributorError::SubmissionRejected { nonce, .. }
            | DistributorError::RevertedOnChain { nonce, .. }
            | DistributorError::FinalizationTimeout { nonce, .. } => Some(*nonce),
            _ => None,
        }
    }
}

/// Result type for distributor operations
pub type DistributorResult<T> = Result<T, DistributorError>;
