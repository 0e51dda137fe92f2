//! Transaction lifecycle: nonce sequencing, fee estimation, signing and submission

mod builder;
mod gas;
mod nonce;
mod sender;

pub use builder::TransactionBuilder;
pub use gas::FeeEstimator;
pub use nonce::{NonceSequencer, NonceState};
pub use sender::{PendingTransaction, Submitter, TransactionStatus};
