//! Error types for the keysync agent

use thiserror::Error;

/// Main error type for the agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error talking to {endpoint}: {message}")]
    Network { endpoint: String, message: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Transaction rejected by node (code {code}): {log}")]
    Rejected { code: u32, log: String },

    #[error("Gas estimation error: {0}")]
    Estimation(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Transaction {tx_hash} failed during execution (code {code}): {log}")]
    ExecutionFailed {
        tx_hash: String,
        code: u32,
        log: String,
    },

    #[error("Confirmation of {tx_hash} cancelled")]
    Cancelled { tx_hash: String },

    #[error("Timeout waiting for confirmation of {tx_hash} after {attempts} attempts")]
    DeadlineExceeded { tx_hash: String, attempts: u32 },

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Public key fetch error: {0}")]
    KeyFetch(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Network { .. }
                | AgentError::NotFound { .. }
                | AgentError::DeadlineExceeded { .. }
                | AgentError::KeyFetch(_)
        )
    }

    /// Check if error should trigger an alert
    pub fn should_alert(&self) -> bool {
        matches!(
            self,
            AgentError::Signing(_) | AgentError::Config(_) | AgentError::ExecutionFailed { .. }
        )
    }

    /// Short, stable label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "config",
            AgentError::Network { .. } => "network",
            AgentError::NotFound { .. } => "not_found",
            AgentError::Rejected { .. } => "rejected",
            AgentError::Estimation(_) => "estimation",
            AgentError::Signing(_) => "signing",
            AgentError::Encoding(_) => "encoding",
            AgentError::ExecutionFailed { .. } => "execution_failed",
            AgentError::Cancelled { .. } => "cancelled",
            AgentError::DeadlineExceeded { .. } => "deadline_exceeded",
            AgentError::Contract(_) => "contract",
            AgentError::KeyFetch(_) => "key_fetch",
            AgentError::Encryption(_) => "encryption",
            AgentError::Io(_) => "io",
        }
    }
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        let network = AgentError::Network {
            endpoint: "http://localhost:1317".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(network.is_retryable());

        let rejected = AgentError::Rejected {
            code: 13,
            log: "insufficient fee".to_string(),
        };
        assert!(!rejected.is_retryable());
        assert!(!AgentError::Estimation("bad msg".to_string()).is_retryable());
    }

    #[test]
    fn test_signing_errors_alert() {
        assert!(AgentError::Signing("bad key".to_string()).should_alert());
        assert_eq!(AgentError::Signing("x".to_string()).kind(), "signing");
    }
}
