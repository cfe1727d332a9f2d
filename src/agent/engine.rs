//! Key-sync loop: keep the contract's public key current and re-encrypt the
//! plaintext under it

use super::status::AgentStatus;
use crate::config::{AgentConfig, ContractConfig};
use crate::contract::ContractClient;
use crate::encryption::Encryptor;
use crate::error::{AgentError, AgentResult};
use crate::keyshare::KeySource;

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Steps of bootstrap and of one key-sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    RequestIdentity,
    FetchIdentity,
    RegisterContract,
    FetchKey,
    UpdateKey,
    Store,
}

impl CycleStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStep::RequestIdentity => "request_identity",
            CycleStep::FetchIdentity => "fetch_identity",
            CycleStep::RegisterContract => "register_contract",
            CycleStep::FetchKey => "fetch_key",
            CycleStep::UpdateKey => "update_pubkey",
            CycleStep::Store => "store",
        }
    }
}

/// Drives identity bootstrap and the periodic key-sync cycle
pub struct KeySyncAgent {
    contract: ContractClient,
    keys: Arc<dyn KeySource>,
    encryptor: Arc<dyn Encryptor>,
    config: AgentConfig,
    contract_config: ContractConfig,
    status: Arc<AgentStatus>,
    /// Shutdown flag
    shutdown: watch::Receiver<bool>,
}

impl KeySyncAgent {
    pub fn new(
        contract: ContractClient,
        keys: Arc<dyn KeySource>,
        encryptor: Arc<dyn Encryptor>,
        config: AgentConfig,
        contract_config: ContractConfig,
        status: Arc<AgentStatus>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            contract,
            keys,
            encryptor,
            config,
            contract_config,
            status,
            shutdown,
        }
    }

    /// Resolve the identity to encrypt to, registering the contract if needed.
    ///
    /// Each step is retried after `retry_backoff_secs` until it succeeds.
    /// Only `Signing` and `Config` errors are returned. `None` means shutdown
    /// was requested first.
    pub async fn bootstrap(&self) -> AgentResult<Option<String>> {
        if let Some(identity) = &self.contract_config.identity {
            info!("Using configured identity {}", identity);
            return Ok(Some(identity.clone()));
        }

        let authorized = self.contract_config.authorized_address.as_str();

        let Some(requested) = self
            .retry_step(CycleStep::RequestIdentity, || {
                self.contract.request_identity(authorized)
            })
            .await?
        else {
            return Ok(None);
        };
        debug!("Identity request included in tx {}", requested.transaction_hash);

        if !self.pause(Duration::from_secs(self.config.identity_wait_secs)).await {
            return Ok(None);
        }

        let Some(identity) = self
            .retry_step(CycleStep::FetchIdentity, || {
                self.contract.fetch_identity(authorized)
            })
            .await?
        else {
            return Ok(None);
        };
        info!("Fetched identity {} for {}", identity, authorized);

        if self
            .retry_step(CycleStep::RegisterContract, || {
                self.contract.register_contract(&identity)
            })
            .await?
            .is_none()
        {
            return Ok(None);
        }
        info!("Contract {} registered", self.contract.contract());

        Ok(Some(identity))
    }

    /// Run `op` until it succeeds, backing off between attempts
    async fn retry_step<T, F, Fut>(&self, step: CycleStep, mut op: F) -> AgentResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AgentResult<T>>,
    {
        let backoff = Duration::from_secs(self.config.retry_backoff_secs);

        loop {
            match op().await {
                Ok(value) => return Ok(Some(value)),
                Err(AgentError::Cancelled { .. }) if *self.shutdown.borrow() => return Ok(None),
                Err(e @ (AgentError::Signing(_) | AgentError::Config(_))) => {
                    error!("Bootstrap step {} failed permanently: {}", step.as_str(), e);
                    return Err(e);
                }
                Err(e) => {
                    self.status.record_failure(step.as_str(), &e.to_string()).await;
                    crate::metrics::record_cycle_failure(step.as_str());
                    warn!(
                        "Bootstrap step {} failed, retrying in {:?}: {}",
                        step.as_str(),
                        backoff,
                        e
                    );
                }
            }

            if !self.pause(backoff).await {
                return Ok(None);
            }
        }
    }

    /// Main loop; returns once shutdown is requested
    pub async fn run(&self) -> AgentResult<()> {
        let Some(identity) = self.bootstrap().await? else {
            info!("Shutdown requested during bootstrap");
            return Ok(());
        };
        self.status.set_identity(&identity).await;

        let cycle_interval = Duration::from_secs(self.config.cycle_interval_secs);
        let backoff = Duration::from_secs(self.config.retry_backoff_secs);

        info!("Key-sync agent started for identity {}", identity);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let delay = match self.run_cycle(&identity).await {
                Ok(()) => {
                    self.status.record_success().await;
                    crate::metrics::record_cycle_success();
                    cycle_interval
                }
                Err((_, AgentError::Cancelled { tx_hash })) if *self.shutdown.borrow() => {
                    info!("Stopped waiting for {} on shutdown", tx_hash);
                    break;
                }
                Err((step, e)) => {
                    self.status.record_failure(step.as_str(), &e.to_string()).await;
                    crate::metrics::record_cycle_failure(step.as_str());

                    if e.should_alert() {
                        error!("Cycle step {} failed: {}", step.as_str(), e);
                    } else {
                        warn!("Cycle step {} failed: {}", step.as_str(), e);
                    }

                    match step {
                        CycleStep::Store => cycle_interval,
                        _ => {
                            debug!(
                                "Retrying in {:?} (retryable: {})",
                                backoff,
                                e.is_retryable()
                            );
                            backoff
                        }
                    }
                }
            };

            if !self.pause(delay).await {
                break;
            }
        }

        info!("Key-sync agent stopped");
        Ok(())
    }

    /// Fetch the current key, publish it and store fresh ciphertext
    pub async fn run_cycle(&self, identity: &str) -> Result<(), (CycleStep, AgentError)> {
        let public_key = self
            .keys
            .fetch_public_key()
            .await
            .map_err(|e| (CycleStep::FetchKey, e))?;
        debug!("Current public key {}", public_key);

        let updated = self
            .contract
            .update_pubkey(&public_key)
            .await
            .map_err(|e| (CycleStep::UpdateKey, e))?;
        self.status.set_public_key(&public_key).await;
        info!("Contract public key updated in tx {}", updated.transaction_hash);

        let stored = self
            .encrypt_and_store(identity, &public_key)
            .await
            .map_err(|e| (CycleStep::Store, e))?;
        info!("Encrypted data stored in tx {}", stored);

        Ok(())
    }

    async fn encrypt_and_store(&self, identity: &str, public_key: &str) -> AgentResult<String> {
        let plaintext = tokio::fs::read(&self.contract_config.plaintext_file).await?;
        let ciphertext = self
            .encryptor
            .encrypt(public_key, identity, &plaintext)
            .await?;
        let result = self.contract.store_encrypted_data(identity, &ciphertext).await?;
        Ok(result.transaction_hash)
    }

    /// Sleep for `duration`; false if shutdown was requested first
    async fn pause(&self, duration: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => !*self.shutdown.borrow(),
            _ = shutdown.wait_for(|stop| *stop) => false,
        }
    }
}
