//! Transaction submission: account sequencing, gas estimation, signing,
//! broadcast and confirmation polling

mod account;
mod broadcast;
mod builder;
mod confirm;
mod gas;
pub mod proto;
mod sender;
mod signer;

#[cfg(test)]
pub mod testing;

pub use account::{Account, AccountTracker};
pub use broadcast::{Broadcaster, SubmissionReceipt};
pub use builder::{
    Operation, PreparedTransaction, SignedTransaction, SignerMetadata, TransactionBuilder,
    UnsignedTransaction,
};
pub use confirm::{ConfirmationOutcome, ConfirmationPoller, ConfirmationResult, PollPolicy};
pub use gas::{adjusted_limit, ResourceEstimator};
pub use sender::TransactionSender;
pub use signer::{derive_address, verify_signature, LocalSigner};
