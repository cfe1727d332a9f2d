//! Transaction assembly and signing
//!
//! Signing is a two-step process. `PreparedTransaction::prepare_unsigned_payload`
//! serializes the body and the auth info (signer public key, sign mode and
//! sequence already in place, signature slot still empty) and freezes the
//! resulting SignDoc bytes. `attach_signature` then consumes the prepared
//! transaction, so nothing can change the payload after it has been signed.

use super::account::Account;
use super::gas::ResourceEstimator;
use super::proto::{
    Any, AuthInfo, Coin, Fee, ModeInfo, ModeInfoSingle, PubKey, SignDoc, SignerInfo, TxBody,
    TxRaw, SECP256K1_PUBKEY_TYPE_URL, SIGN_MODE_DIRECT,
};
use super::signer::{verify_signature, LocalSigner};
use crate::error::{AgentError, AgentResult};

use prost::Message;
use sha2::{Digest, Sha256};
use tracing::debug;

/// An opaque ledger instruction, packed as a protobuf `Any`
pub type Operation = Any;

/// Length of a compact secp256k1 signature
const SIGNATURE_LEN: usize = 64;

/// Transaction contents before any signer is attached
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub operations: Vec<Operation>,
    pub fee: Coin,
    pub resource_limit: u64,
    pub memo: String,
}

/// Signer data bound into the signed payload; taken from one account snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerMetadata {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
    pub public_key: Vec<u8>,
}

impl SignerMetadata {
    pub fn from_account(account: &Account, chain_id: &str, public_key: &[u8]) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            account_number: account.account_number,
            sequence: account.sequence,
            public_key: public_key.to_vec(),
        }
    }
}

/// Serialized transaction whose sign bytes are final but which carries no signature
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    body_bytes: Vec<u8>,
    auth_info_bytes: Vec<u8>,
    sign_doc_bytes: Vec<u8>,
}

impl PreparedTransaction {
    /// Serialize body and auth info and compute the SignDoc the signature must cover
    pub fn prepare_unsigned_payload(
        tx: &UnsignedTransaction,
        metadata: &SignerMetadata,
    ) -> AgentResult<Self> {
        validate_operations(&tx.operations)?;

        let body = TxBody {
            messages: tx.operations.clone(),
            memo: tx.memo.clone(),
            timeout_height: 0,
        };

        let signer_info = SignerInfo {
            public_key: Some(Any::pack(
                SECP256K1_PUBKEY_TYPE_URL,
                &PubKey {
                    key: metadata.public_key.clone(),
                },
            )),
            mode_info: Some(ModeInfo {
                single: Some(ModeInfoSingle {
                    mode: SIGN_MODE_DIRECT,
                }),
            }),
            sequence: metadata.sequence,
        };

        let auth_info = AuthInfo {
            signer_infos: vec![signer_info],
            fee: Some(Fee {
                amount: vec![tx.fee.clone()],
                gas_limit: tx.resource_limit,
                payer: String::new(),
                granter: String::new(),
            }),
        };

        let body_bytes = body.encode_to_vec();
        let auth_info_bytes = auth_info.encode_to_vec();
        let sign_doc_bytes = SignDoc {
            body_bytes: body_bytes.clone(),
            auth_info_bytes: auth_info_bytes.clone(),
            chain_id: metadata.chain_id.clone(),
            account_number: metadata.account_number,
        }
        .encode_to_vec();

        Ok(Self {
            body_bytes,
            auth_info_bytes,
            sign_doc_bytes,
        })
    }

    /// The exact bytes the signature is computed over
    pub fn sign_bytes(&self) -> &[u8] {
        &self.sign_doc_bytes
    }

    /// Encoding accepted by the simulate endpoint: one empty signature per signer
    pub fn simulation_bytes(&self) -> Vec<u8> {
        TxRaw {
            body_bytes: self.body_bytes.clone(),
            auth_info_bytes: self.auth_info_bytes.clone(),
            signatures: vec![Vec::new()],
        }
        .encode_to_vec()
    }

    /// Fill the signature slot; body and auth info bytes are reused untouched
    pub fn attach_signature(self, signature: Vec<u8>) -> AgentResult<SignedTransaction> {
        if signature.len() != SIGNATURE_LEN {
            return Err(AgentError::Signing(format!(
                "Expected {}-byte signature, got {}",
                SIGNATURE_LEN,
                signature.len()
            )));
        }

        Ok(SignedTransaction {
            raw: TxRaw {
                body_bytes: self.body_bytes,
                auth_info_bytes: self.auth_info_bytes,
                signatures: vec![signature],
            },
        })
    }
}

/// Fully signed transaction in wire form
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    raw: TxRaw,
}

impl SignedTransaction {
    /// Decode wire bytes back into a signed transaction
    pub fn decode(bytes: &[u8]) -> AgentResult<Self> {
        let raw = TxRaw::decode(bytes)
            .map_err(|e| AgentError::Encoding(format!("Invalid transaction bytes: {}", e)))?;
        Ok(Self { raw })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.encode_to_vec()
    }

    /// Transaction hash as indexed by the node: upper-case hex SHA-256 of the wire bytes
    pub fn hash(&self) -> String {
        hex::encode_upper(Sha256::digest(self.to_bytes()))
    }

    /// Check the signature against the public key embedded in the auth info
    pub fn verify(&self, chain_id: &str, account_number: u64) -> AgentResult<()> {
        let auth_info = AuthInfo::decode(self.raw.auth_info_bytes.as_slice())
            .map_err(|e| AgentError::Encoding(format!("Invalid auth info: {}", e)))?;
        let public_key = auth_info
            .signer_infos
            .first()
            .and_then(|info| info.public_key.as_ref())
            .filter(|any| any.type_url == SECP256K1_PUBKEY_TYPE_URL)
            .ok_or_else(|| AgentError::Signing("No secp256k1 signer in auth info".to_string()))?;
        let public_key = PubKey::decode(public_key.value.as_slice())
            .map_err(|e| AgentError::Encoding(format!("Invalid public key: {}", e)))?;
        let signature = self
            .raw
            .signatures
            .first()
            .ok_or_else(|| AgentError::Signing("Transaction carries no signature".to_string()))?;

        let sign_doc = SignDoc {
            body_bytes: self.raw.body_bytes.clone(),
            auth_info_bytes: self.raw.auth_info_bytes.clone(),
            chain_id: chain_id.to_string(),
            account_number,
        }
        .encode_to_vec();

        verify_signature(&public_key.key, &sign_doc, signature)
    }
}

/// Builds and signs transactions for one chain with a fixed fee
pub struct TransactionBuilder {
    chain_id: String,
    fee: Coin,
    memo: String,
    estimator: ResourceEstimator,
}

impl TransactionBuilder {
    pub fn new(chain_id: &str, fee_denom: &str, fee_amount: u64, memo: &str, estimator: ResourceEstimator) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            fee: Coin {
                denom: fee_denom.to_string(),
                amount: fee_amount.to_string(),
            },
            memo: memo.to_string(),
            estimator,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Assemble, optionally gas-estimate, sign and encode one transaction
    pub async fn build_and_sign(
        &self,
        operations: &[Operation],
        account: &Account,
        signer: &LocalSigner,
        adjust_resource: bool,
    ) -> AgentResult<SignedTransaction> {
        let metadata = SignerMetadata::from_account(account, &self.chain_id, signer.public_key());
        let mut tx = UnsignedTransaction {
            operations: operations.to_vec(),
            fee: self.fee.clone(),
            resource_limit: self.estimator.default_limit(),
            memo: self.memo.clone(),
        };

        if adjust_resource {
            let draft = PreparedTransaction::prepare_unsigned_payload(&tx, &metadata)?;
            tx.resource_limit = self.estimator.estimate(&draft).await?;
        }

        debug!(
            "Building tx: {} operation(s), sequence {}, gas limit {}",
            tx.operations.len(),
            metadata.sequence,
            tx.resource_limit
        );

        let prepared = PreparedTransaction::prepare_unsigned_payload(&tx, &metadata)?;
        let signature = signer.sign(prepared.sign_bytes())?;
        prepared.attach_signature(signature)
    }
}

fn validate_operations(operations: &[Operation]) -> AgentResult<()> {
    if operations.is_empty() {
        return Err(AgentError::Encoding(
            "Transaction needs at least one operation".to_string(),
        ));
    }
    if let Some(op) = operations.iter().find(|op| !op.type_url.starts_with('/')) {
        return Err(AgentError::Encoding(format!(
            "Operation type URL must start with '/': {:?}",
            op.type_url
        )));
    }
    Ok(())
}
