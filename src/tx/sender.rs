//! Transaction sender: the single submission path for the agent's account
//!
//! One `TransactionSender` owns the signing key and the account snapshot.
//! `submit` runs refresh -> estimate -> sign -> broadcast under a lock so
//! concurrent callers never sign with the same sequence, then releases the
//! lock and polls for the execution result.

use super::account::{Account, AccountTracker};
use super::broadcast::{Broadcaster, SubmissionReceipt};
use super::builder::{Operation, TransactionBuilder};
use super::confirm::{ConfirmationOutcome, ConfirmationPoller, ConfirmationResult, PollPolicy};
use super::gas::ResourceEstimator;
use super::signer::LocalSigner;
use crate::config::TxConfig;
use crate::error::{AgentError, AgentResult};
use crate::ledger::LedgerClient;

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Transaction sender with serialized sequencing and bounded confirmation
pub struct TransactionSender {
    /// Signing key for the account
    signer: LocalSigner,
    /// Account state tracker
    accounts: AccountTracker,
    /// Transaction builder (with gas estimator)
    builder: TransactionBuilder,
    /// Broadcaster
    broadcaster: Broadcaster,
    /// Confirmation poller
    poller: ConfirmationPoller,
    /// Held from account refresh until broadcast returns
    submit_lock: Mutex<()>,
    /// Shutdown flag; cancels confirmation polling
    shutdown: watch::Receiver<bool>,
}

impl TransactionSender {
    /// Create a new transaction sender
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: LocalSigner,
        chain_id: &str,
        config: &TxConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let estimator = ResourceEstimator::new(
            ledger.clone(),
            config.gas_adjustment,
            config.default_gas_limit,
        );
        let builder = TransactionBuilder::new(
            chain_id,
            &config.fee_denom,
            config.fee_amount,
            &config.memo,
            estimator,
        );
        let policy = PollPolicy {
            interval: config.poll_interval(),
            deadline: config.confirmation_timeout(),
            max_attempts: config.max_poll_attempts(),
        };

        info!("Transaction sender initialized for account {}", signer.address());

        Self {
            accounts: AccountTracker::new(ledger.clone()),
            builder,
            broadcaster: Broadcaster::new(ledger.clone()),
            poller: ConfirmationPoller::new(ledger, policy),
            signer,
            submit_lock: Mutex::new(()),
            shutdown,
        }
    }

    /// Account address transactions are signed for
    pub fn address(&self) -> &str {
        self.signer.address()
    }

    /// Most recent account snapshot
    pub async fn last_account(&self) -> Option<Account> {
        self.accounts.last().await
    }

    /// Submit operations as one transaction and wait for its execution result.
    ///
    /// A non-zero admission code is returned as `Rejected` without polling.
    /// A non-zero execution code is *not* an error here; callers inspect
    /// `ConfirmationResult::execution_code`.
    pub async fn submit(
        &self,
        operations: &[Operation],
        adjust_resource: bool,
    ) -> AgentResult<ConfirmationResult> {
        let span = info_span!("submit", id = %Uuid::new_v4(), ops = operations.len());
        async move {
            let result = self.submit_inner(operations, adjust_resource).await;
            match &result {
                Ok(confirmation) if confirmation.is_success() => {
                    crate::metrics::record_tx_confirmed();
                }
                Ok(confirmation) => {
                    warn!(
                        "Transaction {} executed with code {}: {}",
                        confirmation.transaction_hash,
                        confirmation.execution_code,
                        confirmation.raw_log
                    );
                    crate::metrics::record_tx_execution_failed();
                }
                Err(e) => crate::metrics::record_tx_error(e.kind()),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn submit_inner(
        &self,
        operations: &[Operation],
        adjust_resource: bool,
    ) -> AgentResult<ConfirmationResult> {
        let receipt = self.sign_and_broadcast(operations, adjust_resource).await?;
        crate::metrics::record_tx_submitted();

        if !receipt.is_accepted() {
            crate::metrics::record_tx_rejected();
            return Err(AgentError::Rejected {
                code: receipt.initial_response_code,
                log: receipt.raw_log,
            });
        }

        let mut cancel = self.shutdown.clone();
        match self
            .poller
            .await_confirmation(&receipt.transaction_hash, &mut cancel)
            .await?
        {
            ConfirmationOutcome::Found(result) => Ok(result),
            ConfirmationOutcome::Cancelled => Err(AgentError::Cancelled {
                tx_hash: receipt.transaction_hash,
            }),
            ConfirmationOutcome::DeadlineExceeded { attempts } => {
                Err(AgentError::DeadlineExceeded {
                    tx_hash: receipt.transaction_hash,
                    attempts,
                })
            }
        }
    }

    /// Refresh, build, sign and broadcast while holding the submission lock
    async fn sign_and_broadcast(
        &self,
        operations: &[Operation],
        adjust_resource: bool,
    ) -> AgentResult<SubmissionReceipt> {
        let _guard = self.submit_lock.lock().await;

        let account = self.accounts.refresh(self.signer.address()).await?;
        let signed = self
            .builder
            .build_and_sign(operations, &account, &self.signer, adjust_resource)
            .await?;
        debug!(
            "Signed tx {} on {} with sequence {}",
            signed.hash(),
            self.builder.chain_id(),
            account.sequence
        );

        self.broadcaster.submit(&signed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::testing::ScriptedLedger;

    const KEY: &str = "0303030303030303030303030303030303030303030303030303030303030303";

    fn tx_config() -> TxConfig {
        TxConfig {
            max_poll_attempts: 10,
            ..TxConfig::default()
        }
    }

    fn sender(ledger: Arc<ScriptedLedger>) -> (TransactionSender, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signer = LocalSigner::from_hex(KEY, "fairy").unwrap();
        let sender = TransactionSender::new(
            ledger,
            signer,
            ScriptedLedger::CHAIN_ID,
            &tx_config(),
            shutdown_rx,
        );
        (sender, shutdown_tx)
    }

    fn operation(tag: u8) -> Operation {
        Operation {
            type_url: "/cosmwasm.wasm.v1.MsgExecuteContract".to_string(),
            value: vec![tag],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_submissions_use_next_sequence() {
        let ledger = Arc::new(ScriptedLedger::new(7, 5));
        let (sender, _shutdown) = sender(ledger.clone());

        for tag in 0..3 {
            let result = sender.submit(&[operation(tag)], false).await.unwrap();
            assert!(result.is_success());
        }

        assert_eq!(ledger.broadcast_sequences(), vec![5, 6, 7]);
        assert_eq!(sender.last_account().await.unwrap().sequence, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_submissions_against_committed_state() {
        let ledger = Arc::new(ScriptedLedger::new(7, 5));
        ledger.report_committed_sequence();
        ledger.set_misses_before_found(2);
        let (sender, _shutdown) = sender(ledger.clone());

        for tag in 0..3 {
            sender.submit(&[operation(tag)], false).await.unwrap();
        }

        // Each submission is indexed before the next refresh reads the account
        assert_eq!(ledger.broadcast_sequences(), vec![5, 6, 7]);
        assert_eq!(sender.last_account().await.unwrap().sequence, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signed_bytes_verify_against_account() {
        let ledger = Arc::new(ScriptedLedger::new(7, 0));
        let (sender, _shutdown) = sender(ledger.clone());

        sender.submit(&[operation(1)], true).await.unwrap();

        let signed = ledger.last_signed().unwrap();
        signed.verify(ScriptedLedger::CHAIN_ID, 7).unwrap();
        assert_eq!(ledger.simulate_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_rejection_skips_polling() {
        let ledger = Arc::new(ScriptedLedger::new(7, 0));
        ledger.set_broadcast_code(13, "insufficient fee");
        let (sender, _shutdown) = sender(ledger.clone());

        let err = sender.submit(&[operation(1)], false).await.unwrap_err();
        match err {
            AgentError::Rejected { code, log } => {
                assert_eq!(code, 13);
                assert_eq!(log, "insufficient fee");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(ledger.get_tx_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_failure_is_data() {
        let ledger = Arc::new(ScriptedLedger::new(7, 0));
        ledger.set_execution(5, "insufficient funds");
        let (sender, _shutdown) = sender(ledger.clone());

        let result = sender.submit(&[operation(1)], false).await.unwrap();
        assert!(result.found);
        assert_eq!(result.execution_code, 5);
        assert_eq!(result.raw_log, "insufficient funds");
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_account_surfaces_not_found() {
        let ledger = Arc::new(ScriptedLedger::new(7, 0));
        ledger.remove_account();
        let (sender, _shutdown) = sender(ledger.clone());

        let err = sender.submit(&[operation(1)], false).await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound { .. }));
        assert!(ledger.broadcast_sequences().is_empty());
    }

    // The fake reports the admission sequence here, so callers queued on the
    // lock see each other's transactions before they are indexed.
    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_serialized() {
        let ledger = Arc::new(ScriptedLedger::new(7, 10));
        let (sender, _shutdown) = sender(ledger.clone());
        let sender = Arc::new(sender);

        let handles: Vec<_> = (0..4)
            .map(|tag| {
                let sender = sender.clone();
                tokio::spawn(async move { sender.submit(&[operation(tag)], false).await })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut sequences = ledger.broadcast_sequences();
        sequences.sort_unstable();
        assert_eq!(sequences, vec![10, 11, 12, 13]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_confirmation() {
        let ledger = Arc::new(ScriptedLedger::new(7, 0));
        ledger.set_misses_before_found(u32::MAX);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signer = LocalSigner::from_hex(KEY, "fairy").unwrap();
        let config = TxConfig {
            max_poll_attempts: 0,
            confirmation_timeout_secs: 0,
            ..TxConfig::default()
        };
        let sender = TransactionSender::new(
            ledger.clone(),
            signer,
            ScriptedLedger::CHAIN_ID,
            &config,
            shutdown_rx,
        );

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            let _ = shutdown_tx.send(true);
        });

        let err = sender.submit(&[operation(1)], false).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled { .. }));
    }
}
