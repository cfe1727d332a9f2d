//! REST ledger client with multi-endpoint support and automatic failover

use super::types::{
    AccountResponse, BaseAccount, GatewayError, LatestBlockResponse, SimulateResponse,
    SmartQueryResponse, TxBytesRequest, TxEnvelope, BROADCAST_MODE_SYNC, GRPC_NOT_FOUND,
};
use super::{AccountInfo, BroadcastResponse, LedgerClient, TxLookup};
use crate::config::LedgerConfig;
use crate::error::{AgentError, AgentResult};

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Failure of a single gateway call, before it is mapped to an `AgentError`
#[derive(Debug)]
enum RestError {
    Transport { endpoint: String, message: String },
    NotFound(String),
    Status { status: u16, code: i32, message: String },
    /// A 2xx response whose body does not decode
    Malformed(String),
}

impl RestError {
    /// Default mapping for read-only queries
    fn into_query_error(self, what: &str) -> AgentError {
        match self {
            RestError::Transport { endpoint, message } => AgentError::Network { endpoint, message },
            RestError::NotFound(message) => AgentError::NotFound {
                what: format!("{} ({})", what, message),
            },
            RestError::Status {
                status,
                code,
                message,
            } => AgentError::Network {
                endpoint: what.to_string(),
                message: format!("HTTP {} (code {}): {}", status, code, message),
            },
            RestError::Malformed(message) => {
                AgentError::Encoding(format!("Malformed {} response: {}", what, message))
            }
        }
    }
}

/// Ledger client speaking the Cosmos gRPC-gateway REST API
pub struct RestLedgerClient {
    /// Ledger configuration
    config: LedgerConfig,
    /// Shared HTTP client
    http: Client,
    /// Current active endpoint index
    current_endpoint: AtomicUsize,
}

impl RestLedgerClient {
    /// Create a new REST ledger client
    pub fn new(config: LedgerConfig) -> AgentResult<Self> {
        if config.rest_urls.is_empty() {
            return Err(AgentError::Config("No ledger REST URLs configured".to_string()));
        }

        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        debug!(
            "Ledger client for chain {} using {} endpoint(s)",
            config.chain_id,
            config.rest_urls.len()
        );

        Ok(Self {
            config,
            http,
            current_endpoint: AtomicUsize::new(0),
        })
    }

    /// Get the active endpoint base URL
    pub fn endpoint(&self) -> &str {
        let idx = self.current_endpoint.load(Ordering::Relaxed);
        self.config.rest_urls[idx % self.config.rest_urls.len()].trim_end_matches('/')
    }

    /// Switch to next available endpoint
    pub fn failover(&self) {
        let current = self.current_endpoint.load(Ordering::Relaxed);
        let next = (current + 1) % self.config.rest_urls.len();
        self.current_endpoint.store(next, Ordering::Relaxed);
        warn!(
            "Chain {} failover to endpoint {}",
            self.config.chain_id, next
        );
    }

    /// GET with failover across endpoints on transport errors
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let mut last_error = None;

        for _ in 0..self.config.rest_urls.len() {
            let url = format!("{}{}", self.endpoint(), path);
            match self.execute(self.http.get(&url), self.endpoint()).await {
                Err(RestError::Transport { endpoint, message }) => {
                    warn!("Request to {} failed: {}", endpoint, message);
                    last_error = Some(RestError::Transport { endpoint, message });
                    self.failover();
                }
                other => return other,
            }
        }

        Err(last_error.unwrap_or_else(|| RestError::Transport {
            endpoint: path.to_string(),
            message: "All endpoints failed".to_string(),
        }))
    }

    /// POST against the active endpoint only; submissions are not replayed elsewhere
    async fn post<T: DeserializeOwned>(&self, path: &str, body: &TxBytesRequest<'_>) -> Result<T, RestError> {
        let url = format!("{}{}", self.endpoint(), path);
        let result = self
            .execute(self.http.post(&url).json(body), self.endpoint())
            .await;
        if matches!(result, Err(RestError::Transport { .. })) {
            self.failover();
        }
        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<T, RestError> {
        let transport = |e: reqwest::Error| RestError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|e| RestError::Malformed(e.to_string()));
        }

        let gateway: GatewayError = serde_json::from_slice(&body).unwrap_or_else(|_| GatewayError {
            code: 0,
            message: String::from_utf8_lossy(&body).into_owned(),
        });

        if status == StatusCode::NOT_FOUND || gateway.code == GRPC_NOT_FOUND {
            return Err(RestError::NotFound(gateway.message));
        }

        Err(RestError::Status {
            status: status.as_u16(),
            code: gateway.code,
            message: gateway.message,
        })
    }
}

#[async_trait]
impl LedgerClient for RestLedgerClient {
    async fn query_account(&self, address: &str) -> AgentResult<AccountInfo> {
        let path = format!("/cosmos/auth/v1beta1/accounts/{}", address);
        let response: AccountResponse = self
            .get(&path)
            .await
            .map_err(|e| e.into_query_error(&format!("account {}", address)))?;

        let base = BaseAccount::locate(&response.account).ok_or_else(|| AgentError::NotFound {
            what: format!("base account data for {}", address),
        })?;
        let account: BaseAccount = serde_json::from_value(base.clone())
            .map_err(|e| AgentError::Encoding(format!("Invalid account response: {}", e)))?;

        Ok(AccountInfo {
            address: account.address,
            account_number: account.account_number,
            sequence: account.sequence,
        })
    }

    async fn simulate(&self, tx_bytes: &[u8]) -> AgentResult<u64> {
        let body = TxBytesRequest {
            tx_bytes: STANDARD.encode(tx_bytes),
            mode: None,
        };
        let response: SimulateResponse = self
            .post("/cosmos/tx/v1beta1/simulate", &body)
            .await
            .map_err(|e| match e {
                RestError::Transport { endpoint, message } => {
                    AgentError::Network { endpoint, message }
                }
                RestError::NotFound(message) => AgentError::Estimation(message),
                RestError::Status { code, message, .. } => {
                    AgentError::Estimation(format!("simulation rejected (code {}): {}", code, message))
                }
                RestError::Malformed(message) => {
                    AgentError::Encoding(format!("Malformed simulate response: {}", message))
                }
            })?;

        Ok(response.gas_info.gas_used)
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> AgentResult<BroadcastResponse> {
        let body = TxBytesRequest {
            tx_bytes: STANDARD.encode(tx_bytes),
            mode: Some(BROADCAST_MODE_SYNC),
        };
        let response: TxEnvelope = self
            .post("/cosmos/tx/v1beta1/txs", &body)
            .await
            .map_err(|e| match e {
                RestError::Transport { endpoint, message } => {
                    AgentError::Network { endpoint, message }
                }
                RestError::NotFound(message) => AgentError::Rejected {
                    code: GRPC_NOT_FOUND as u32,
                    log: message,
                },
                RestError::Status { code, message, .. } => AgentError::Rejected {
                    code: code.max(0) as u32,
                    log: message,
                },
                RestError::Malformed(message) => {
                    AgentError::Encoding(format!("Malformed broadcast response: {}", message))
                }
            })?;

        Ok(BroadcastResponse {
            tx_hash: response.tx_response.txhash,
            code: response.tx_response.code,
            raw_log: response.tx_response.raw_log,
        })
    }

    async fn get_tx(&self, tx_hash: &str) -> AgentResult<TxLookup> {
        let path = format!("/cosmos/tx/v1beta1/txs/{}", tx_hash);
        let response: TxEnvelope = self
            .get(&path)
            .await
            .map_err(|e| e.into_query_error(&format!("transaction {}", tx_hash)))?;

        let tx = response.tx_response;
        Ok(TxLookup {
            tx_hash: tx.txhash,
            height: tx.height,
            code: tx.code,
            raw_log: tx.raw_log,
            gas_used: tx.gas_used,
        })
    }

    async fn smart_query(&self, contract: &str, query: &Value) -> AgentResult<Value> {
        let encoded = URL_SAFE.encode(query.to_string());
        let path = format!("/cosmwasm/wasm/v1/contract/{}/smart/{}", contract, encoded);
        let response: SmartQueryResponse = self
            .get(&path)
            .await
            .map_err(|e| e.into_query_error(&format!("contract {}", contract)))?;

        Ok(response.data)
    }

    async fn latest_height(&self) -> AgentResult<u64> {
        let response: LatestBlockResponse = self
            .get("/cosmos/base/tendermint/v1beta1/blocks/latest")
            .await
            .map_err(|e| e.into_query_error("latest block"))?;

        Ok(response.block.header.height)
    }
}
