//! Shared view of the agent's progress, read by the HTTP API

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Success,
    Failed { step: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub started_at: DateTime<Utc>,
    pub identity: Option<String>,
    pub public_key: Option<String>,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
}

pub struct AgentStatus {
    inner: RwLock<StatusSnapshot>,
}

impl AgentStatus {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StatusSnapshot {
                started_at: Utc::now(),
                identity: None,
                public_key: None,
                cycles_completed: 0,
                cycles_failed: 0,
                last_cycle_at: None,
                last_outcome: None,
            }),
        }
    }

    pub async fn snapshot(&self) -> StatusSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn set_identity(&self, identity: &str) {
        self.inner.write().await.identity = Some(identity.to_string());
    }

    pub async fn set_public_key(&self, public_key: &str) {
        self.inner.write().await.public_key = Some(public_key.to_string());
    }

    pub async fn record_success(&self) {
        let mut status = self.inner.write().await;
        status.cycles_completed += 1;
        status.last_cycle_at = Some(Utc::now());
        status.last_outcome = Some(CycleOutcome::Success);
    }

    pub async fn record_failure(&self, step: &str, error: &str) {
        let mut status = self.inner.write().await;
        status.cycles_failed += 1;
        status.last_cycle_at = Some(Utc::now());
        status.last_outcome = Some(CycleOutcome::Failed {
            step: step.to_string(),
            error: error.to_string(),
        });
    }

    /// Seconds since the agent started
    pub async fn uptime_seconds(&self) -> u64 {
        let started = self.inner.read().await.started_at;
        (Utc::now() - started).num_seconds().max(0) as u64
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::new()
    }
}
