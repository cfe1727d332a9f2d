//! Account state tracking for replay-safe sequencing
//!
//! Handles:
//! - Fresh account number and sequence before every signing attempt
//! - Detection of transactions issued by someone else from the same account
//!
//! The sequence is never incremented locally; the ledger is the only source.

use crate::error::AgentResult;
use crate::ledger::LedgerClient;

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Snapshot of the signing account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: String,
    pub account_number: u64,
    pub sequence: u64,
}

/// Queries the ledger for the current account state
pub struct AccountTracker {
    ledger: Arc<dyn LedgerClient>,
    /// Most recent snapshot
    last: Mutex<Option<Account>>,
}

impl AccountTracker {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ledger,
            last: Mutex::new(None),
        }
    }

    /// Fetch the account's current state.
    ///
    /// Fails with `NotFound` when the address has no on-chain account yet;
    /// it must be funded externally first.
    pub async fn refresh(&self, address: &str) -> AgentResult<Account> {
        let info = self.ledger.query_account(address).await?;
        let account = Account {
            address: address.to_string(),
            account_number: info.account_number,
            sequence: info.sequence,
        };

        let mut last = self.last.lock().await;
        if let Some(previous) = last.as_ref() {
            // Our own submissions advance the sequence by exactly one between refreshes
            if account.sequence > previous.sequence + 1 {
                warn!(
                    "Sequence gap on {}: last seen {}, now {} (external transactions?)",
                    address, previous.sequence, account.sequence
                );
            } else if account.sequence < previous.sequence {
                warn!(
                    "Sequence went backwards on {}: {} -> {}",
                    address, previous.sequence, account.sequence
                );
            }
        }

        debug!(
            "Account {}: number {}, sequence {}",
            address, account.account_number, account.sequence
        );
        crate::metrics::record_account_sequence(account.sequence);

        *last = Some(account.clone());
        Ok(account)
    }

    /// Most recent snapshot, if any refresh has succeeded
    pub async fn last(&self) -> Option<Account> {
        self.last.lock().await.clone()
    }
}
