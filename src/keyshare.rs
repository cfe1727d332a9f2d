//! Keyshare module client
//!
//! Reads the public encryption key the keyshare module publishes for the
//! upcoming round.

use crate::config::KeyshareConfig;
use crate::error::{AgentError, AgentResult};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const PUBKEY_PATH: &str = "/fairyring/keyshare/pubkey";

/// Source of the current encryption public key
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Hex-encoded public key the contract should be updated to
    async fn fetch_public_key(&self) -> AgentResult<String>;
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PubKeyInfo {
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub expiry: String,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct PubKeyResponse {
    #[serde(default)]
    pub active_pubkey: PubKeyInfo,
    #[serde(default)]
    pub queued_pubkey: PubKeyInfo,
}

impl PubKeyResponse {
    /// The queued key, or the active key when nothing is queued
    pub fn select(self) -> AgentResult<String> {
        if !self.queued_pubkey.public_key.is_empty() {
            return Ok(self.queued_pubkey.public_key);
        }
        if !self.active_pubkey.public_key.is_empty() {
            debug!("No queued public key, using active key");
            return Ok(self.active_pubkey.public_key);
        }
        Err(AgentError::KeyFetch("Keyshare module has no public key".to_string()))
    }
}

/// HTTP client for the keyshare REST endpoint
pub struct KeyshareClient {
    base_url: String,
    http: Client,
}

impl KeyshareClient {
    pub fn new(config: &KeyshareConfig, timeout: Duration) -> AgentResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, PUBKEY_PATH)
    }
}

#[async_trait]
impl KeySource for KeyshareClient {
    async fn fetch_public_key(&self) -> AgentResult<String> {
        let url = self.url();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::KeyFetch(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AgentError::KeyFetch(format!("Bad status from {}: {}", url, status)));
        }

        let body: PubKeyResponse = response
            .json()
            .await
            .map_err(|e| AgentError::KeyFetch(format!("Invalid public key response: {}", e)))?;

        body.select()
    }
}
