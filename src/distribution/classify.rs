//! Failure classification for submit-and-wait

use crate::error::DistributorError;

use std::fmt;

/// How a batch failure affects nonce state and the rest of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Rejected before entering the pool; the nonce slot is still free
    SubmissionRejected,
    /// Included, then dropped by reorgs past the retry budget
    RevertedOnChain,
    /// Inclusion or confirmation never observed; the transaction may still be pending
    FinalizationTimeout,
    /// Node unreachable or misbehaving; chain state unknown
    TransportError,
}

impl FailureKind {
    /// Whether the reserved nonce must be handed back
    pub fn rolls_back_nonce(&self) -> bool {
        matches!(self, FailureKind::SubmissionRejected)
    }

    /// Whether the run must stop instead of moving to the next batch
    pub fn aborts_run(&self) -> bool {
        matches!(self, FailureKind::TransportError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SubmissionRejected => "submission_rejected",
            FailureKind::RevertedOnChain => "reverted_on_chain",
            FailureKind::FinalizationTimeout => "finalization_timeout",
            FailureKind::TransportError => "transport_error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a failure raised anywhere in submit-or-wait
pub fn classify(error: &DistributorError) -> FailureKind {
    match error {
        // Nothing was broadcast or the node refused it
        DistributorError::SubmissionRejected { .. }
        | DistributorError::Rejected(_)
        | DistributorError::Signing(_) => FailureKind::SubmissionRejected,
        DistributorError::RevertedOnChain { .. } => FailureKind::RevertedOnChain,
        DistributorError::FinalizationTimeout { .. } => FailureKind::FinalizationTimeout,
        DistributorError::Transport(_)
        | DistributorError::Config(_)
        | DistributorError::Validation { .. }
        | DistributorError::Io(_) => FailureKind::TransportError,
    }
}
