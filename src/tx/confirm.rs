//! Confirmation polling for broadcast transactions
//!
//! A sync-mode broadcast only says the node queued the transaction. The
//! execution result becomes visible once the transaction is indexed, so the
//! poller asks for it by hash until it shows up:
//!
//! - `NotFound`: not indexed yet, wait one interval and ask again
//! - found: done, whatever the execution code
//! - any other error: fatal, returned to the caller
//!
//! Polling stops early on cancellation, on the optional deadline, or after
//! the optional maximum number of attempts.

use crate::error::{AgentError, AgentResult};
use crate::ledger::{LedgerClient, TxLookup};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

/// Final execution result of an included transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationResult {
    pub transaction_hash: String,
    pub found: bool,
    pub execution_code: u32,
    pub raw_log: String,
    pub height: u64,
    pub gas_used: u64,
}

impl ConfirmationResult {
    pub fn is_success(&self) -> bool {
        self.found && self.execution_code == 0
    }

    fn from_lookup(lookup: TxLookup) -> Self {
        Self {
            transaction_hash: lookup.tx_hash,
            found: true,
            execution_code: lookup.code,
            raw_log: lookup.raw_log,
            height: lookup.height,
            gas_used: lookup.gas_used,
        }
    }
}

/// Terminal states of a polling run other than a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Found(ConfirmationResult),
    Cancelled,
    DeadlineExceeded { attempts: u32 },
}

/// Timing bounds for a polling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Option<Duration>,
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            deadline: None,
            max_attempts: None,
        }
    }
}

/// Polls the ledger for a transaction's execution result
pub struct ConfirmationPoller {
    ledger: Arc<dyn LedgerClient>,
    policy: PollPolicy,
}

impl ConfirmationPoller {
    pub fn new(ledger: Arc<dyn LedgerClient>, policy: PollPolicy) -> Self {
        Self { ledger, policy }
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Wait for `tx_hash` to be indexed.
    ///
    /// `cancel` flipping to `true` ends the run with `Cancelled`, including
    /// while a lookup is in flight.
    pub async fn await_confirmation(
        &self,
        tx_hash: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> AgentResult<ConfirmationOutcome> {
        let started = Instant::now();
        let deadline = self.policy.deadline.map(|d| started + d);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            crate::metrics::record_poll_attempt();

            let lookup = tokio::select! {
                biased;
                _ = cancelled(cancel) => {
                    info!("Confirmation of {} cancelled after {} attempt(s)", tx_hash, attempts - 1);
                    return Ok(ConfirmationOutcome::Cancelled);
                }
                result = self.ledger.get_tx(tx_hash) => result,
            };

            match lookup {
                Ok(lookup) => {
                    let result = ConfirmationResult::from_lookup(lookup);
                    info!(
                        "Transaction {} included at height {} with code {} after {} attempt(s)",
                        tx_hash, result.height, result.execution_code, attempts
                    );
                    crate::metrics::record_confirmation_latency(started.elapsed().as_secs_f64());
                    return Ok(ConfirmationOutcome::Found(result));
                }
                Err(AgentError::NotFound { .. }) => {
                    debug!("Transaction {} not indexed yet (attempt {})", tx_hash, attempts);
                }
                Err(e) => return Err(e),
            }

            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                return Ok(ConfirmationOutcome::DeadlineExceeded { attempts });
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(ConfirmationOutcome::DeadlineExceeded { attempts });
            }

            tokio::select! {
                biased;
                _ = tokio::time::sleep(self.policy.interval) => {}
                _ = cancelled(cancel) => {
                    info!("Confirmation of {} cancelled after {} attempt(s)", tx_hash, attempts);
                    return Ok(ConfirmationOutcome::Cancelled);
                }
                _ = sleep_until(deadline) => {
                    return Ok(ConfirmationOutcome::DeadlineExceeded { attempts });
                }
            }
        }
    }
}

/// Resolves once the flag is raised; never resolves if the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|flag| *flag).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
