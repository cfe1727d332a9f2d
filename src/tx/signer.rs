//! secp256k1 key handling: account address derivation, signing and verification

use crate::error::{AgentError, AgentResult};

use bech32::{Bech32, Hrp};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::fmt;

/// Local single-key signer for the agent's account
pub struct LocalSigner {
    key: SigningKey,
    /// Compressed SEC1 public key (33 bytes)
    public_key: Vec<u8>,
    /// Bech32 account address
    address: String,
}

impl LocalSigner {
    /// Load a signer from a hex-encoded 32-byte private key
    pub fn from_hex(private_key_hex: &str, bech32_prefix: &str) -> AgentResult<Self> {
        let raw = hex::decode(private_key_hex.trim().trim_start_matches("0x"))
            .map_err(|e| AgentError::Signing(format!("Invalid private key hex: {}", e)))?;
        Self::from_bytes(&raw, bech32_prefix)
    }

    pub fn from_bytes(private_key: &[u8], bech32_prefix: &str) -> AgentResult<Self> {
        let key = SigningKey::from_slice(private_key)
            .map_err(|e| AgentError::Signing(format!("Invalid private key: {}", e)))?;
        let public_key = key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        let address = derive_address(&public_key, bech32_prefix)?;

        Ok(Self {
            key,
            public_key,
            address,
        })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign a payload: SHA-256 prehash, RFC 6979 nonce, low-S, 64-byte `r || s`
    pub fn sign(&self, payload: &[u8]) -> AgentResult<Vec<u8>> {
        let digest = Sha256::digest(payload);
        let signature: Signature = self
            .key
            .sign_prehash(&digest)
            .map_err(|e| AgentError::Signing(e.to_string()))?;
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(signature.to_bytes().to_vec())
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Verify a compact signature over `payload` against a compressed public key
pub fn verify_signature(public_key: &[u8], payload: &[u8], signature: &[u8]) -> AgentResult<()> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| AgentError::Signing(format!("Invalid public key: {}", e)))?;
    let signature = Signature::from_slice(signature)
        .map_err(|e| AgentError::Signing(format!("Malformed signature: {}", e)))?;
    let digest = Sha256::digest(payload);

    key.verify_prehash(&digest, &signature)
        .map_err(|_| AgentError::Signing("Signature does not match payload".to_string()))
}

/// Cosmos account address: bech32(prefix, ripemd160(sha256(pubkey)))
pub fn derive_address(public_key: &[u8], prefix: &str) -> AgentResult<String> {
    let hrp = Hrp::parse(prefix)
        .map_err(|e| AgentError::Config(format!("Invalid bech32 prefix {}: {}", prefix, e)))?;
    let hash = Ripemd160::digest(Sha256::digest(public_key));

    bech32::encode::<Bech32>(hrp, &hash)
        .map_err(|e| AgentError::Encoding(format!("Address encoding failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0101010101010101010101010101010101010101010101010101010101010101";

    #[test]
    fn test_address_has_prefix_and_twenty_byte_payload() {
        let signer = LocalSigner::from_hex(KEY, "fairy").unwrap();
        assert!(signer.address().starts_with("fairy1"));
        assert_eq!(signer.public_key().len(), 33);

        let (hrp, data) = bech32::decode(signer.address()).unwrap();
        assert_eq!(hrp.as_str(), "fairy");
        assert_eq!(data.len(), 20);
    }

    #[test]
    fn test_signatures_are_deterministic_and_verify() {
        let signer = LocalSigner::from_hex(&format!("0x{}", KEY), "fairy").unwrap();
        let first = signer.sign(b"sign doc bytes").unwrap();
        let second = signer.sign(b"sign doc bytes").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        verify_signature(signer.public_key(), b"sign doc bytes", &first).unwrap();
        assert!(verify_signature(signer.public_key(), b"other bytes", &first).is_err());
    }

    #[test]
    fn test_rejects_invalid_key_material() {
        assert!(matches!(
            LocalSigner::from_hex("zz", "fairy"),
            Err(AgentError::Signing(_))
        ));
        // The zero scalar is not a valid secp256k1 key
        assert!(matches!(
            LocalSigner::from_bytes(&[0u8; 32], "fairy"),
            Err(AgentError::Signing(_))
        ));
    }
}
