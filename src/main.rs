//! Keysync Agent - keeps an encryption public key in sync on a Cosmos ledger
//!
//! The agent publishes the keyshare module's current public key on an
//! identity contract and stores data encrypted to its registered identity,
//! submitting every change as a signed transaction and waiting for it to be
//! executed.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

mod agent;
mod api;
mod config;
mod contract;
mod encryption;
mod error;
mod keyshare;
mod ledger;
mod metrics;
mod tx;

use agent::{AgentStatus, KeySyncAgent};
use config::Settings;
use contract::ContractClient;
use encryption::CommandEncryptor;
use keyshare::KeyshareClient;
use ledger::{LedgerClient, RestLedgerClient};
use metrics::MetricsServer;
use tx::{LocalSigner, TransactionSender};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Keysync Agent v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for chain {} ({} endpoint(s))",
        settings.ledger.chain_id,
        settings.ledger.rest_urls.len()
    );

    // Load the signing key
    let signer = LocalSigner::from_hex(&settings.private_key_hex()?, &settings.ledger.bech32_prefix)
        .context("Invalid private key")?;
    info!("Agent account {}", signer.address());

    let ledger: Arc<dyn LedgerClient> = Arc::new(
        RestLedgerClient::new(settings.ledger.clone()).context("Failed to create ledger client")?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sender = Arc::new(TransactionSender::new(
        ledger.clone(),
        signer,
        &settings.ledger.chain_id,
        &settings.tx,
        shutdown_rx.clone(),
    ));

    let keys = Arc::new(
        KeyshareClient::new(
            &settings.keyshare,
            Duration::from_millis(settings.ledger.request_timeout_ms),
        )
        .context("Failed to create keyshare client")?,
    );
    let status = Arc::new(AgentStatus::new());

    let agent = Arc::new(KeySyncAgent::new(
        ContractClient::new(sender.clone(), ledger.clone(), &settings.contract.address),
        keys,
        Arc::new(CommandEncryptor::new(&settings.encryption)),
        settings.agent.clone(),
        settings.contract.clone(),
        status.clone(),
        shutdown_rx,
    ));

    // Start API server
    let api_handle = tokio::spawn({
        let state = api::AppState {
            sender: sender.clone(),
            ledger: ledger.clone(),
            status: status.clone(),
            chain_id: settings.ledger.chain_id.clone(),
        };
        let config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Start the key-sync loop
    let mut agent_handle = tokio::spawn({
        let agent = agent.clone();
        async move { agent.run().await }
    });

    info!("Keysync Agent is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal or for the agent to give up
    let agent_result = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping...");
            // Stops the loop and any confirmation wait in flight
            let _ = shutdown_tx.send(true);
            (&mut agent_handle).await
        }
        result = &mut agent_handle => {
            let _ = shutdown_tx.send(true);
            result
        }
    };

    // Abort background tasks
    api_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    match agent_result.context("Key-sync agent task panicked")? {
        Ok(()) => {
            info!("Keysync Agent stopped");
            Ok(())
        }
        Err(e) => {
            error!("Key-sync agent error: {}", e);
            Err(e).context("Key-sync agent exited")
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,keysync_agent=debug,hyper=warn,reqwest=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
