//! Sync-mode transaction broadcast

use super::builder::SignedTransaction;
use crate::error::AgentResult;
use crate::ledger::LedgerClient;

use std::sync::Arc;
use tracing::{info, warn};

/// Node acknowledgement of a broadcast; says nothing about execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub transaction_hash: String,
    pub initial_response_code: u32,
    pub raw_log: String,
}

impl SubmissionReceipt {
    /// Accepted into the node's queue
    pub fn is_accepted(&self) -> bool {
        self.initial_response_code == 0
    }
}

pub struct Broadcaster {
    ledger: Arc<dyn LedgerClient>,
}

impl Broadcaster {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Submit in accept-into-queue mode and return the node's immediate answer
    pub async fn submit(&self, signed: &SignedTransaction) -> AgentResult<SubmissionReceipt> {
        let response = self.ledger.broadcast(&signed.to_bytes()).await?;

        let receipt = SubmissionReceipt {
            transaction_hash: if response.tx_hash.is_empty() {
                signed.hash()
            } else {
                response.tx_hash
            },
            initial_response_code: response.code,
            raw_log: response.raw_log,
        };

        if receipt.is_accepted() {
            info!("Transaction {} accepted into mempool", receipt.transaction_hash);
        } else {
            warn!(
                "Transaction {} rejected at admission (code {}): {}",
                receipt.transaction_hash, receipt.initial_response_code, receipt.raw_log
            );
        }

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::ledger::{BroadcastResponse, MockLedgerClient};
    use crate::tx::proto::TxRaw;

    fn signed() -> SignedTransaction {
        let raw = TxRaw {
            body_bytes: vec![1],
            auth_info_bytes: vec![2],
            signatures: vec![vec![0; 64]],
        };
        SignedTransaction::decode(&prost::Message::encode_to_vec(&raw)).unwrap()
    }

    #[tokio::test]
    async fn test_empty_hash_falls_back_to_local_hash() {
        let mut ledger = MockLedgerClient::new();
        ledger.expect_broadcast().times(1).returning(|_| {
            Ok(BroadcastResponse {
                tx_hash: String::new(),
                code: 0,
                raw_log: String::new(),
            })
        });

        let tx = signed();
        let receipt = Broadcaster::new(Arc::new(ledger)).submit(&tx).await.unwrap();
        assert!(receipt.is_accepted());
        assert_eq!(receipt.transaction_hash, tx.hash());
    }

    #[tokio::test]
    async fn test_admission_code_is_reported_not_raised() {
        let mut ledger = MockLedgerClient::new();
        ledger.expect_broadcast().returning(|_| {
            Ok(BroadcastResponse {
                tx_hash: "ABCD".to_string(),
                code: 19,
                raw_log: "tx already in mempool".to_string(),
            })
        });

        let receipt = Broadcaster::new(Arc::new(ledger)).submit(&signed()).await.unwrap();
        assert!(!receipt.is_accepted());
        assert_eq!(receipt.initial_response_code, 19);
        assert_eq!(receipt.transaction_hash, "ABCD");
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let mut ledger = MockLedgerClient::new();
        ledger.expect_broadcast().returning(|_| {
            Err(AgentError::Network {
                endpoint: "http://127.0.0.1:1317".to_string(),
                message: "connection reset".to_string(),
            })
        });

        let err = Broadcaster::new(Arc::new(ledger)).submit(&signed()).await.unwrap_err();
        assert!(matches!(err, AgentError::Network { .. }));
    }
}
