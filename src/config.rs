/// Wallet configuration from environment variables or a TOML file
///
/// Controls the ledger network, node endpoint, sync behaviour and retry policy.
/// Defaults to testnet for development compatibility.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::WalletError;
use crate::ledger::ProtocolParameters;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

/// Node request policy: every call is timeout-bounded and retried when transient
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Base URL of the node REST API; `None` runs against the in-memory node
    pub url: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Age after which a pending transaction the node never saw counts as rejected
    pub pending_expiry_secs: u64,
}

impl NodeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout_ms: 10_000,
            max_retries: 3,
            retry_backoff_ms: 250,
            pending_expiry_secs: 600,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Consecutive unused addresses after which address discovery stops
    pub gap_limit: u32,
    /// Upper bound on concurrent node queries during a sync
    pub parallel_requests: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            gap_limit: 20,
            parallel_requests: 8,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub network: Network,
    pub protocol: ProtocolParameters,
    pub node: NodeConfig,
    pub sync: SyncConfig,
    /// Directory holding account files; `None` keeps accounts in memory only
    pub storage_dir: Option<PathBuf>,
    /// Listen address of the API server
    pub bind_address: String,
}

impl WalletConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `LEDGER_NETWORK`: "testnet" (default) or "mainnet"
    /// - `NODE_URL`: node REST endpoint (optional, in-memory node when unset)
    /// - `WALLET_DIR`: account storage directory (optional)
    /// - `SYNC_GAP_LIMIT`: address gap limit (default 20)
    /// - `NODE_TIMEOUT_MS`: per-request timeout (default 10000)
    /// - `NODE_MAX_RETRIES`: retries for transient node failures (default 3)
    /// - `BIND_ADDRESS`: API listen address (default 0.0.0.0:3000)
    ///
    /// # Examples
    ///
    /// ```bash
    /// # Testnet against a local node
    /// NODE_URL=http://localhost:14265 WALLET_DIR=./wallet-data cargo run
    /// ```
    pub fn from_env() -> Self {
        let network_str = env::var("LEDGER_NETWORK")
            .unwrap_or_else(|_| "testnet".to_string())
            .to_lowercase();

        let network = match network_str.as_str() {
            "mainnet" => {
                log::info!("Using MAINNET network");
                Network::Mainnet
            }
            "testnet" | "" => {
                log::info!("Using TESTNET network");
                Network::Testnet
            }
            other => {
                log::warn!("Unknown network '{}', defaulting to testnet", other);
                Network::Testnet
            }
        };

        let mut config = Self::for_network(network);

        config.node.url = env::var("NODE_URL").ok().filter(|url| !url.is_empty());
        match &config.node.url {
            Some(url) => log::info!("Node URL: {}", url),
            None => log::info!("No NODE_URL set, using the in-memory node"),
        }

        config.storage_dir = env::var("WALLET_DIR").ok().map(PathBuf::from);

        if let Some(gap_limit) = parse_env("SYNC_GAP_LIMIT") {
            config.sync.gap_limit = gap_limit;
        }
        if let Some(timeout) = parse_env("NODE_TIMEOUT_MS") {
            config.node.request_timeout_ms = timeout;
        }
        if let Some(retries) = parse_env("NODE_MAX_RETRIES") {
            config.node.max_retries = retries;
        }
        if let Ok(bind_address) = env::var("BIND_ADDRESS") {
            config.bind_address = bind_address;
        }

        config
    }

    /// Load configuration from a TOML file; missing keys take their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self, WalletError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WalletError::InvalidInput(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse TOML configuration; without a `[protocol]` table the network's own parameters apply
    pub fn from_toml_str(contents: &str) -> Result<Self, WalletError> {
        let table: toml::Table = toml::from_str(contents)
            .map_err(|e| WalletError::InvalidInput(format!("invalid config: {}", e)))?;
        let has_protocol = table.contains_key("protocol");

        let mut config: Self = toml::Value::Table(table)
            .try_into()
            .map_err(|e| WalletError::InvalidInput(format!("invalid config: {}", e)))?;
        if !has_protocol {
            config.protocol = Self::for_network(config.network).protocol;
        }
        Ok(config)
    }

    pub fn for_network(network: Network) -> Self {
        let protocol = match network {
            Network::Mainnet => ProtocolParameters::mainnet(),
            Network::Testnet => ProtocolParameters::testnet(),
        };
        Self {
            network,
            protocol,
            node: NodeConfig::default(),
            sync: SyncConfig::default(),
            storage_dir: None,
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
        }
    }

    /// Get the BIP44 coin type for this network
    ///
    /// - Mainnet: 4219
    /// - Testnet: 1
    pub fn coin_type(&self) -> u32 {
        match self.network {
            Network::Mainnet => 4219,
            Network::Testnet => 1,
        }
    }

    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self.network {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }

    pub fn bech32_hrp(&self) -> &str {
        &self.protocol.bech32_hrp
    }
}

impl Default for WalletConfig {
    /// Default configuration (testnet)
    fn default() -> Self {
        Self::for_network(Network::Testnet)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("Ignoring invalid value '{}' for {}", value, key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_testnet() {
        let config = WalletConfig::default();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.bech32_hrp(), "rms");
        assert_eq!(config.sync.gap_limit, 20);
    }

    #[test]
    fn test_coin_type() {
        assert_eq!(WalletConfig::for_network(Network::Testnet).coin_type(), 1);
        assert_eq!(WalletConfig::for_network(Network::Mainnet).coin_type(), 4219);
    }

    #[test]
    fn test_toml_overrides_and_defaults() {
        let config = WalletConfig::from_toml_str(
            r#"
            network = "mainnet"

            [sync]
            gap_limit = 5

            [node]
            url = "http://localhost:14265"
            max_retries = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.bech32_hrp(), "smr");
        assert_eq!(config.sync.gap_limit, 5);
        assert_eq!(config.sync.parallel_requests, 8);
        assert_eq!(config.node.url.as_deref(), Some("http://localhost:14265"));
        assert_eq!(config.node.max_retries, 1);
        assert_eq!(config.node.request_timeout_ms, 10_000);
    }
}
