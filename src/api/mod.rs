//! HTTP API for health checks and agent status

use crate::agent::{AgentStatus, StatusSnapshot};
use crate::config::ApiConfig;
use crate::error::AgentResult;
use crate::ledger::LedgerClient;
use crate::tx::TransactionSender;

use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sender: Arc<TransactionSender>,
    pub ledger: Arc<dyn LedgerClient>,
    pub status: Arc<AgentStatus>,
    pub chain_id: String,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> AgentResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - the ledger answers a block query
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let (code, response) = match state.ledger.latest_height().await {
        Ok(height) => (
            StatusCode::OK,
            ReadinessResponse {
                ready: true,
                chain_id: state.chain_id.clone(),
                latest_height: Some(height),
                error: None,
            },
        ),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ReadinessResponse {
                    ready: false,
                    chain_id: state.chain_id.clone(),
                    latest_height: None,
                    error: Some(e.to_string()),
                },
            )
        }
    };

    crate::metrics::record_health_check(response.ready);
    (code, Json(response))
}

/// Get agent status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let account = state.sender.last_account().await;

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.status.uptime_seconds().await,
        chain_id: state.chain_id.clone(),
        address: state.sender.address().to_string(),
        account_number: account.as_ref().map(|a| a.account_number),
        sequence: account.as_ref().map(|a| a.sequence),
        agent: state.status.snapshot().await,
    })
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    chain_id: String,
    latest_height: Option<u64>,
    error: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_seconds: u64,
    chain_id: String,
    address: String,
    account_number: Option<u64>,
    sequence: Option<u64>,
    agent: StatusSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TxConfig;
    use crate::error::AgentError;
    use crate::ledger::MockLedgerClient;
    use crate::tx::testing::ScriptedLedger;
    use crate::tx::LocalSigner;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tokio::sync::watch;
    use tower::ServiceExt;

    const KEY: &str = "0606060606060606060606060606060606060606060606060606060606060606";

    fn state(ledger: Arc<dyn LedgerClient>) -> AppState {
        let (_, shutdown_rx) = watch::channel(false);
        let signer = LocalSigner::from_hex(KEY, "fairy").unwrap();
        let sender = TransactionSender::new(
            ledger.clone(),
            signer,
            ScriptedLedger::CHAIN_ID,
            &TxConfig::default(),
            shutdown_rx,
        );
        AppState {
            sender: Arc::new(sender),
            ledger,
            status: Arc::new(AgentStatus::new()),
            chain_id: ScriptedLedger::CHAIN_ID.to_string(),
        }
    }

    async fn get_json(app: Router, path: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = tokio_test::assert_ok!(app.oneshot(request).await);
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(state(Arc::new(ScriptedLedger::new(1, 0))));
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_reports_height() {
        let app = router(state(Arc::new(ScriptedLedger::new(1, 0))));
        let (status, body) = get_json(app, "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["latest_height"], 42);
    }

    #[tokio::test]
    async fn test_not_ready_when_ledger_unreachable() {
        let mut ledger = MockLedgerClient::new();
        ledger.expect_latest_height().returning(|| {
            Err(AgentError::Network {
                endpoint: "http://127.0.0.1:1317".to_string(),
                message: "connection refused".to_string(),
            })
        });

        let app = router(state(Arc::new(ledger)));
        let (status, body) = get_json(app, "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);
    }

    #[tokio::test]
    async fn test_status_before_first_submission() {
        let state = state(Arc::new(ScriptedLedger::new(1, 0)));
        let address = state.sender.address().to_string();
        state.status.set_identity("id-1").await;

        let (status, body) = get_json(router(state), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["address"], address);
        assert_eq!(body["sequence"], Value::Null);
        assert_eq!(body["agent"]["identity"], "id-1");
    }
}
