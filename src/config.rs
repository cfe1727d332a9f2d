//! Configuration management for the keysync agent
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub agent: AgentConfig,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub tx: TxConfig,
    pub wallet: WalletConfig,
    pub contract: ContractConfig,
    pub keyshare: KeyshareConfig,
    pub encryption: EncryptionConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Seconds between successful key-sync cycles
    #[serde(default = "default_cycle_interval_secs")]
    pub cycle_interval_secs: u64,
    /// Seconds to back off after a failed cycle step
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// Seconds to wait between requesting an identity and reading it back
    #[serde(default = "default_identity_wait_secs")]
    pub identity_wait_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// REST (gRPC-gateway) endpoints, first is primary
    pub rest_urls: Vec<String>,
    pub chain_id: String,
    #[serde(default = "default_bech32_prefix")]
    pub bech32_prefix: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxConfig {
    pub fee_denom: String,
    pub fee_amount: u64,
    pub default_gas_limit: u64,
    pub gas_adjustment: f64,
    pub poll_interval_ms: u64,
    /// Zero disables the deadline
    pub confirmation_timeout_secs: u64,
    /// Zero disables the attempt bound
    pub max_poll_attempts: u32,
    #[serde(default)]
    pub memo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding the hex private key
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractConfig {
    pub address: String,
    pub authorized_address: String,
    pub plaintext_file: PathBuf,
    /// Pre-registered identity; skips identity request and registration
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyshareConfig {
    pub rest_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_cycle_interval_secs() -> u64 {
    20
}

fn default_retry_backoff_secs() -> u64 {
    10
}

fn default_identity_wait_secs() -> u64 {
    5
}

fn default_bech32_prefix() -> String {
    "fairy".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            fee_denom: "ufairy".to_string(),
            fee_amount: 800,
            default_gas_limit: 300_000,
            gas_adjustment: 3.0,
            poll_interval_ms: 1_000,
            confirmation_timeout_secs: 120,
            max_poll_attempts: 0,
            memo: String::new(),
        }
    }
}

impl TxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        (self.confirmation_timeout_secs > 0)
            .then(|| Duration::from_secs(self.confirmation_timeout_secs))
    }

    pub fn max_poll_attempts(&self) -> Option<u32> {
        (self.max_poll_attempts > 0).then_some(self.max_poll_attempts)
    }
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("KEYSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.ledger.rest_urls.is_empty() {
            anyhow::bail!("At least one ledger REST URL must be configured");
        }
        if self.ledger.chain_id.is_empty() {
            anyhow::bail!("ledger.chain_id must not be empty");
        }
        if self.tx.gas_adjustment <= 0.0 || !self.tx.gas_adjustment.is_finite() {
            anyhow::bail!(
                "tx.gas_adjustment must be a positive number, got {}",
                self.tx.gas_adjustment
            );
        }
        if self.tx.default_gas_limit == 0 {
            anyhow::bail!("tx.default_gas_limit must be greater than zero");
        }
        if self.tx.poll_interval_ms == 0 {
            anyhow::bail!("tx.poll_interval_ms must be greater than zero");
        }
        if self.contract.address.is_empty() {
            anyhow::bail!("contract.address must not be empty");
        }
        if self.encryption.command.is_empty() {
            anyhow::bail!("encryption.command must not be empty");
        }
        if self.tx.confirmation_timeout_secs == 0 && self.tx.max_poll_attempts == 0 {
            tracing::warn!("Confirmation polling is unbounded; only shutdown will interrupt it");
        }

        Ok(())
    }

    /// Read the signing key from the configured environment variable
    pub fn private_key_hex(&self) -> Result<String> {
        env::var(&self.wallet.private_key_env).with_context(|| {
            format!(
                "Private key environment variable {} is not set",
                self.wallet.private_key_env
            )
        })
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[agent]
cycle_interval_secs = 20

[ledger]
rest_urls = ["${KEYSYNC_TEST_LCD}"]
chain_id = "fairyring-testnet-3"

[tx]
fee_denom = "ufairy"
fee_amount = 800
default_gas_limit = 300000
gas_adjustment = 3.0
poll_interval_ms = 1000
confirmation_timeout_secs = 60
max_poll_attempts = 0

[wallet]
private_key_env = "KEYSYNC_PRIVATE_KEY"

[contract]
address = "fairy14hj2tavq8fpesdwxxcu44rty3hh90vhujrvcmstl4zr3txmfvw9s5xw8wy"
authorized_address = "fairy1authorized"
plaintext_file = "secret.txt"

[keyshare]
rest_url = "http://localhost:1317"

[encryption]
command = "encrypter"

[api]
host = "127.0.0.1"
port = 8080

[metrics]
enabled = false
port = 9090
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("KEYSYNC_TEST_LCD", "http://127.0.0.1:1317");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.ledger.rest_urls, vec!["http://127.0.0.1:1317"]);
        assert_eq!(settings.ledger.bech32_prefix, "fairy");
        assert_eq!(settings.agent.retry_backoff_secs, 10);
        assert_eq!(settings.tx.confirmation_timeout(), Some(Duration::from_secs(60)));
        assert_eq!(settings.tx.max_poll_attempts(), None);
        assert!(settings.contract.identity.is_none());
    }

    #[test]
    fn test_loads_shipped_default_config() {
        env::set_var("FAIRYRING_REST_URL", "http://127.0.0.1:1317");
        env::set_var("KEYSYNC_CONTRACT_ADDRESS", "fairy1contract");
        env::set_var("KEYSYNC_AUTHORIZED_ADDRESS", "fairy1authorized");
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.tx.fee_amount, 800);
        assert_eq!(settings.tx.fee_denom, "ufairy");
        assert_eq!(settings.tx.default_gas_limit, 300_000);
        assert_eq!(settings.tx.gas_adjustment, 3.0);
        assert_eq!(settings.ledger.rest_urls, vec!["http://127.0.0.1:1317"]);
        assert_eq!(settings.contract.address, "fairy1contract");
        assert_eq!(settings.wallet.private_key_env, "KEYSYNC_PRIVATE_KEY");
    }

    #[test]
    fn test_rejects_non_positive_gas_adjustment() {
        let broken = SAMPLE.replace("gas_adjustment = 3.0", "gas_adjustment = 0.0");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(broken.as_bytes()).unwrap();

        let err = Settings::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("gas_adjustment"));
    }
}
