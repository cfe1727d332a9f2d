//! Identity-based encryption of the agent's plaintext
//!
//! The agent does not implement the pairing scheme itself; it hands the
//! plaintext to an external encrypter program and stores whatever hex
//! ciphertext that program prints.

use crate::config::EncryptionConfig;
use crate::error::{AgentError, AgentResult};

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Encryptor: Send + Sync {
    /// Encrypt `plaintext` to `identity` under `public_key_hex`, returning hex ciphertext
    async fn encrypt(
        &self,
        public_key_hex: &str,
        identity: &str,
        plaintext: &[u8],
    ) -> AgentResult<String>;
}

/// Runs `command [args..] <identity> <public key>` with the plaintext on stdin
pub struct CommandEncryptor {
    command: String,
    args: Vec<String>,
}

impl CommandEncryptor {
    pub fn new(config: &EncryptionConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl Encryptor for CommandEncryptor {
    async fn encrypt(
        &self,
        public_key_hex: &str,
        identity: &str,
        plaintext: &[u8],
    ) -> AgentResult<String> {
        hex::decode(public_key_hex)
            .map_err(|e| AgentError::Encryption(format!("Public key is not hex: {}", e)))?;

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .arg(identity)
            .arg(public_key_hex)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Encryption(format!("Failed to start {}: {}", self.command, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Encryption("Encrypter stdin unavailable".to_string()))?;

        let write = async move {
            let result = stdin.write_all(plaintext).await;
            drop(stdin);
            result
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());

        let output = output?;
        if !output.status.success() {
            return Err(AgentError::Encryption(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        written?;

        let ciphertext = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if ciphertext.is_empty() {
            return Err(AgentError::Encryption("Encrypter produced no output".to_string()));
        }
        hex::decode(&ciphertext)
            .map_err(|e| AgentError::Encryption(format!("Ciphertext is not hex: {}", e)))?;

        debug!("Encrypted {} bytes for identity {}", plaintext.len(), identity);
        Ok(ciphertext)
    }
}
