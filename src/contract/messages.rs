//! Messages for the identity contract and the pep module

use crate::error::{AgentError, AgentResult};
use crate::tx::proto::{Any, Coin};
use crate::tx::Operation;

use prost::Message;
use serde::{Deserialize, Serialize};

pub const MSG_EXECUTE_CONTRACT_TYPE_URL: &str = "/cosmwasm.wasm.v1.MsgExecuteContract";
pub const MSG_REGISTER_CONTRACT_TYPE_URL: &str = "/fairyring.pep.MsgRegisterContract";

/// `cosmwasm.wasm.v1.MsgExecuteContract`
#[derive(Clone, PartialEq, Message)]
pub struct MsgExecuteContract {
    #[prost(string, tag = "1")]
    pub sender: String,
    #[prost(string, tag = "2")]
    pub contract: String,
    #[prost(bytes = "vec", tag = "3")]
    pub msg: Vec<u8>,
    #[prost(message, repeated, tag = "5")]
    pub funds: Vec<Coin>,
}

/// `fairyring.pep.MsgRegisterContract`
#[derive(Clone, PartialEq, Message)]
pub struct MsgRegisterContract {
    #[prost(string, tag = "1")]
    pub creator: String,
    #[prost(string, tag = "2")]
    pub contract_address: String,
    #[prost(string, tag = "3")]
    pub identity: String,
}

/// Execute messages understood by the identity contract
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteMsg {
    UpdatePubkey { pubkey: String },
    RequestIdentity { authorized_address: String },
    StoreEncryptedData { identity: String, data: String },
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum QueryMsg {
    GetAllIdentity {},
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct IdentityRecord {
    pub identity: String,
    pub creator: String,
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub last_submission: u64,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct AllIdentitiesResponse {
    pub records: Vec<IdentityRecord>,
}

/// Wrap a contract execute message as a ledger operation
pub fn execute_contract(sender: &str, contract: &str, msg: &ExecuteMsg) -> AgentResult<Operation> {
    let msg = serde_json::to_vec(msg)
        .map_err(|e| AgentError::Encoding(format!("Invalid execute message: {}", e)))?;

    Ok(Any::pack(
        MSG_EXECUTE_CONTRACT_TYPE_URL,
        &MsgExecuteContract {
            sender: sender.to_string(),
            contract: contract.to_string(),
            msg,
            funds: Vec::new(),
        },
    ))
}

/// Register a contract with the pep module under an identity
pub fn register_contract(creator: &str, contract: &str, identity: &str) -> Operation {
    Any::pack(
        MSG_REGISTER_CONTRACT_TYPE_URL,
        &MsgRegisterContract {
            creator: creator.to_string(),
            contract_address: contract.to_string(),
            identity: identity.to_string(),
        },
    )
}
