//! JSON shapes returned by the Cosmos REST gateway

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Error body produced by the gRPC gateway for non-2xx responses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// gRPC status code the gateway uses for missing accounts and transactions
pub const GRPC_NOT_FOUND: i32 = 5;

#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub account: Value,
}

/// The fields of a `BaseAccount`, wherever it is nested
#[derive(Debug, Deserialize)]
pub struct BaseAccount {
    pub address: String,
    #[serde(deserialize_with = "u64_from_string")]
    pub account_number: u64,
    #[serde(deserialize_with = "u64_from_string")]
    pub sequence: u64,
}

impl BaseAccount {
    /// Vesting and module accounts wrap the base account one or two levels deep
    pub fn locate(account: &Value) -> Option<&Value> {
        if account.get("account_number").is_some() {
            return Some(account);
        }
        if let Some(base) = account.get("base_account") {
            return Self::locate(base);
        }
        account
            .get("base_vesting_account")
            .and_then(Self::locate)
    }
}

#[derive(Debug, Serialize)]
pub struct TxBytesRequest<'a> {
    pub tx_bytes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'a str>,
}

pub const BROADCAST_MODE_SYNC: &str = "BROADCAST_MODE_SYNC";

#[derive(Debug, Deserialize)]
pub struct SimulateResponse {
    pub gas_info: GasInfo,
}

#[derive(Debug, Deserialize)]
pub struct GasInfo {
    #[serde(default, deserialize_with = "u64_from_string")]
    pub gas_used: u64,
}

#[derive(Debug, Deserialize)]
pub struct TxEnvelope {
    pub tx_response: TxResponse,
}

#[derive(Debug, Deserialize)]
pub struct TxResponse {
    #[serde(default, deserialize_with = "u64_from_string")]
    pub height: u64,
    pub txhash: String,
    #[serde(default)]
    pub code: u32,
    #[serde(default)]
    pub raw_log: String,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub gas_used: u64,
}

#[derive(Debug, Deserialize)]
pub struct SmartQueryResponse {
    pub data: Value,
}

#[derive(Debug, Deserialize)]
pub struct LatestBlockResponse {
    pub block: BlockSummary,
}

#[derive(Debug, Deserialize)]
pub struct BlockSummary {
    pub header: BlockHeader,
}

#[derive(Debug, Deserialize)]
pub struct BlockHeader {
    #[serde(deserialize_with = "u64_from_string")]
    pub height: u64,
}

/// Cosmos JSON encodes 64-bit integers as strings; accept both forms
fn u64_from_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(u64),
    }

    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) if s.is_empty() => Ok(0),
        StringOrNumber::String(s) => s.parse().map_err(serde::de::Error::custom),
        StringOrNumber::Number(n) => Ok(n),
    }
}
