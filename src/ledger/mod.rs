//! Ledger module - the node RPC surface used by the transaction pipeline
//!
//! This module provides:
//! - The transport-agnostic `LedgerClient` trait
//! - A REST (gRPC-gateway) implementation with endpoint failover
//! - Structured lookups so callers branch on error kind, never on text

pub mod rest;
pub mod types;

pub use rest::RestLedgerClient;

use crate::error::AgentResult;

use async_trait::async_trait;
use serde_json::Value;

/// On-chain account state as reported by the auth module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub address: String,
    pub account_number: u64,
    pub sequence: u64,
}

/// Immediate node answer to a sync-mode broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResponse {
    pub tx_hash: String,
    pub code: u32,
    pub raw_log: String,
}

/// Indexed execution result of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLookup {
    pub tx_hash: String,
    pub height: u64,
    pub code: u32,
    pub raw_log: String,
    pub gas_used: u64,
}

/// Node operations consumed by the submission pipeline.
///
/// Implementations must report a missing account or a not-yet-indexed
/// transaction as `AgentError::NotFound`, transport failures as
/// `AgentError::Network`, and a refused simulation as
/// `AgentError::Estimation`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Account number and sequence for an address
    async fn query_account(&self, address: &str) -> AgentResult<AccountInfo>;

    /// Simulate a transaction and return the gas it consumed
    async fn simulate(&self, tx_bytes: &[u8]) -> AgentResult<u64>;

    /// Submit signed bytes in accept-into-queue mode
    async fn broadcast(&self, tx_bytes: &[u8]) -> AgentResult<BroadcastResponse>;

    /// Look up an executed transaction by hash
    async fn get_tx(&self, tx_hash: &str) -> AgentResult<TxLookup>;

    /// Run a CosmWasm smart query against a contract
    async fn smart_query(&self, contract: &str, query: &Value) -> AgentResult<Value>;

    /// Height of the latest committed block
    async fn latest_height(&self) -> AgentResult<u64>;
}
