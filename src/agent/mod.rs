//! Key-sync agent
//!
//! The agent:
//! 1. Requests and registers an identity on the contract (unless configured)
//! 2. Fetches the keyshare module's public key every cycle
//! 3. Publishes it on the contract
//! 4. Encrypts the plaintext file to the identity and stores the ciphertext

pub mod engine;
pub mod status;

pub use engine::{CycleStep, KeySyncAgent};
pub use status::{AgentStatus, CycleOutcome, StatusSnapshot};
