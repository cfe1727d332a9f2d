//! In-memory ledger used by submission and agent tests
//!
//! Behaves like a node for a single account: it checks the signer sequence
//! on broadcast, advances it on admission and indexes accepted transactions
//! after a configurable number of lookups.
//!
//! By default the account query reports the admission (mempool) sequence,
//! which is more optimistic than a real node: `/cosmos/auth/v1beta1/accounts`
//! serves committed state. `report_committed_sequence` switches the account
//! query to the sequence of indexed transactions only.

use super::builder::SignedTransaction;
use super::proto::{AuthInfo, TxBody, TxRaw};
use crate::error::{AgentError, AgentResult};
use crate::ledger::{AccountInfo, BroadcastResponse, LedgerClient, TxLookup};

use async_trait::async_trait;
use prost::Message;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Code the SDK returns for a wrong signer sequence
const ERR_WRONG_SEQUENCE: u32 = 32;

struct LedgerState {
    account_exists: bool,
    account_number: u64,
    /// Sequence the next admitted transaction must carry
    sequence: u64,
    /// Sequence after the last indexed transaction
    committed_sequence: u64,
    report_committed: bool,
    account_failures: u32,
    broadcast_code: u32,
    broadcast_log: String,
    execution_code: u32,
    execution_log: String,
    misses_before_found: u32,
    simulated_gas: u64,
    /// Remaining lookups that answer NotFound, per accepted hash
    pending: HashMap<String, u32>,
    indexed: HashSet<String>,
    broadcasts: Vec<SignedTransaction>,
    broadcast_sequences: Vec<u64>,
    executed_messages: Vec<TxBody>,
    smart_query_response: Value,
    get_tx_calls: u32,
    simulate_calls: u32,
}

pub struct ScriptedLedger {
    state: Mutex<LedgerState>,
}

impl ScriptedLedger {
    pub const CHAIN_ID: &'static str = "fairyring-testnet-3";

    pub fn new(account_number: u64, sequence: u64) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                account_exists: true,
                account_number,
                sequence,
                committed_sequence: sequence,
                report_committed: false,
                account_failures: 0,
                broadcast_code: 0,
                broadcast_log: String::new(),
                execution_code: 0,
                execution_log: String::new(),
                misses_before_found: 1,
                simulated_gas: 100_000,
                pending: HashMap::new(),
                indexed: HashSet::new(),
                broadcasts: Vec::new(),
                broadcast_sequences: Vec::new(),
                executed_messages: Vec::new(),
                smart_query_response: Value::Null,
                get_tx_calls: 0,
                simulate_calls: 0,
            }),
        }
    }

    pub fn set_broadcast_code(&self, code: u32, log: &str) {
        let mut state = self.state.lock().unwrap();
        state.broadcast_code = code;
        state.broadcast_log = log.to_string();
    }

    pub fn set_execution(&self, code: u32, log: &str) {
        let mut state = self.state.lock().unwrap();
        state.execution_code = code;
        state.execution_log = log.to_string();
    }

    pub fn set_misses_before_found(&self, misses: u32) {
        self.state.lock().unwrap().misses_before_found = misses;
    }

    pub fn set_smart_query_response(&self, response: Value) {
        self.state.lock().unwrap().smart_query_response = response;
    }

    /// Account queries return the sequence of indexed transactions only
    pub fn report_committed_sequence(&self) {
        self.state.lock().unwrap().report_committed = true;
    }

    /// Fail the next `count` account queries with a network error
    pub fn fail_account_queries(&self, count: u32) {
        self.state.lock().unwrap().account_failures = count;
    }

    pub fn remove_account(&self) {
        self.state.lock().unwrap().account_exists = false;
    }

    pub fn broadcast_sequences(&self) -> Vec<u64> {
        self.state.lock().unwrap().broadcast_sequences.clone()
    }

    pub fn last_signed(&self) -> Option<SignedTransaction> {
        self.state.lock().unwrap().broadcasts.last().cloned()
    }

    /// Bodies of every transaction admitted so far
    pub fn executed_messages(&self) -> Vec<TxBody> {
        self.state.lock().unwrap().executed_messages.clone()
    }

    pub fn get_tx_calls(&self) -> u32 {
        self.state.lock().unwrap().get_tx_calls
    }

    pub fn simulate_calls(&self) -> u32 {
        self.state.lock().unwrap().simulate_calls
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn query_account(&self, address: &str) -> AgentResult<AccountInfo> {
        // Give concurrent submitters a chance to interleave
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.account_failures > 0 {
            state.account_failures -= 1;
            return Err(AgentError::Network {
                endpoint: "scripted".to_string(),
                message: "connection reset".to_string(),
            });
        }
        if !state.account_exists {
            return Err(AgentError::NotFound {
                what: format!("account {}", address),
            });
        }
        Ok(AccountInfo {
            address: address.to_string(),
            account_number: state.account_number,
            sequence: if state.report_committed {
                state.committed_sequence
            } else {
                state.sequence
            },
        })
    }

    async fn simulate(&self, _tx_bytes: &[u8]) -> AgentResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.simulate_calls += 1;
        Ok(state.simulated_gas)
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> AgentResult<BroadcastResponse> {
        tokio::task::yield_now().await;

        let signed = SignedTransaction::decode(tx_bytes)?;
        let raw = TxRaw::decode(tx_bytes).map_err(|e| AgentError::Encoding(e.to_string()))?;
        let auth_info = AuthInfo::decode(raw.auth_info_bytes.as_slice())
            .map_err(|e| AgentError::Encoding(e.to_string()))?;
        let body = TxBody::decode(raw.body_bytes.as_slice())
            .map_err(|e| AgentError::Encoding(e.to_string()))?;
        let sequence = auth_info.signer_infos[0].sequence;
        let hash = signed.hash();

        let mut state = self.state.lock().unwrap();
        if state.broadcast_code != 0 {
            return Ok(BroadcastResponse {
                tx_hash: hash,
                code: state.broadcast_code,
                raw_log: state.broadcast_log.clone(),
            });
        }
        if sequence != state.sequence {
            return Ok(BroadcastResponse {
                tx_hash: hash,
                code: ERR_WRONG_SEQUENCE,
                raw_log: format!(
                    "account sequence mismatch, expected {}, got {}",
                    state.sequence, sequence
                ),
            });
        }

        state.sequence += 1;
        state.broadcast_sequences.push(sequence);
        state.broadcasts.push(signed);
        state.executed_messages.push(body);
        let misses = state.misses_before_found;
        state.pending.insert(hash.clone(), misses);

        Ok(BroadcastResponse {
            tx_hash: hash,
            code: 0,
            raw_log: String::new(),
        })
    }

    async fn get_tx(&self, tx_hash: &str) -> AgentResult<TxLookup> {
        let mut state = self.state.lock().unwrap();
        state.get_tx_calls += 1;

        let not_found = || AgentError::NotFound {
            what: format!("transaction {}", tx_hash),
        };
        let remaining = state.pending.get_mut(tx_hash).ok_or_else(not_found)?;
        if *remaining > 0 {
            *remaining -= 1;
            return Err(not_found());
        }
        if state.indexed.insert(tx_hash.to_string()) {
            state.committed_sequence += 1;
        }

        Ok(TxLookup {
            tx_hash: tx_hash.to_string(),
            height: 42,
            code: state.execution_code,
            raw_log: state.execution_log.clone(),
            gas_used: state.simulated_gas,
        })
    }

    async fn smart_query(&self, _contract: &str, _query: &Value) -> AgentResult<Value> {
        Ok(self.state.lock().unwrap().smart_query_response.clone())
    }

    async fn latest_height(&self) -> AgentResult<u64> {
        Ok(42)
    }
}
