//! Contract workflows built on the transaction sender

use super::messages::{
    execute_contract, register_contract, AllIdentitiesResponse, ExecuteMsg, QueryMsg,
};
use crate::error::{AgentError, AgentResult};
use crate::ledger::LedgerClient;
use crate::tx::{ConfirmationResult, Operation, TransactionSender};

use std::sync::Arc;
use tracing::{debug, info};

/// Talks to one identity contract on behalf of the agent's account
pub struct ContractClient {
    sender: Arc<TransactionSender>,
    ledger: Arc<dyn LedgerClient>,
    contract: String,
}

impl ContractClient {
    pub fn new(sender: Arc<TransactionSender>, ledger: Arc<dyn LedgerClient>, contract: &str) -> Self {
        Self {
            sender,
            ledger,
            contract: contract.to_string(),
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    /// Ask the contract to request a fresh identity for `authorized_address`
    pub async fn request_identity(&self, authorized_address: &str) -> AgentResult<ConfirmationResult> {
        info!("Requesting identity for {}", authorized_address);
        self.execute(ExecuteMsg::RequestIdentity {
            authorized_address: authorized_address.to_string(),
        })
        .await
    }

    /// The most recent identity record created for `authorized_address`
    pub async fn fetch_identity(&self, authorized_address: &str) -> AgentResult<String> {
        let query = serde_json::to_value(QueryMsg::GetAllIdentity {})
            .map_err(|e| AgentError::Encoding(e.to_string()))?;
        let data = self.ledger.smart_query(&self.contract, &query).await?;
        let response: AllIdentitiesResponse = serde_json::from_value(data)
            .map_err(|e| AgentError::Contract(format!("Unexpected identity query response: {}", e)))?;

        debug!("Contract {} holds {} identity record(s)", self.contract, response.records.len());

        response
            .records
            .into_iter()
            .filter(|record| record.creator == authorized_address)
            .last()
            .map(|record| record.identity)
            .ok_or_else(|| {
                AgentError::Contract(format!("No identity found for {}", authorized_address))
            })
    }

    /// Register the contract with the pep module under `identity`
    pub async fn register_contract(&self, identity: &str) -> AgentResult<ConfirmationResult> {
        info!("Registering contract {} with identity {}", self.contract, identity);
        let op = register_contract(self.sender.address(), &self.contract, identity);
        self.submit_checked(op).await
    }

    /// Publish a new encryption public key on the contract
    pub async fn update_pubkey(&self, pubkey: &str) -> AgentResult<ConfirmationResult> {
        self.execute(ExecuteMsg::UpdatePubkey {
            pubkey: pubkey.to_string(),
        })
        .await
    }

    /// Store hex ciphertext for `identity`
    pub async fn store_encrypted_data(&self, identity: &str, data: &str) -> AgentResult<ConfirmationResult> {
        self.execute(ExecuteMsg::StoreEncryptedData {
            identity: identity.to_string(),
            data: data.to_string(),
        })
        .await
    }

    async fn execute(&self, msg: ExecuteMsg) -> AgentResult<ConfirmationResult> {
        let op = execute_contract(self.sender.address(), &self.contract, &msg)?;
        self.submit_checked(op).await
    }

    /// Submit with gas estimation and treat a non-zero execution code as failure
    async fn submit_checked(&self, op: Operation) -> AgentResult<ConfirmationResult> {
        let result = self.sender.submit(&[op], true).await?;
        if !result.is_success() {
            return Err(AgentError::ExecutionFailed {
                tx_hash: result.transaction_hash,
                code: result.execution_code,
                log: result.raw_log,
            });
        }
        Ok(result)
    }
}
