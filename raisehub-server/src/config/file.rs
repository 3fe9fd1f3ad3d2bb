//! TOML file configuration structures.
//!
//! These structs directly map to the `raisehub-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub ledger: LedgerConfig,
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Ledger node section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub confirmations: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_poll_interval_secs() -> u64 {
    12
}

/// Deployed contract addresses, as hex strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    pub registry: String,
    pub factory: String,
    pub market: String,
}

/// Backfill section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub start_block: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            chunk_size: default_chunk_size(),
        }
    }
}

fn default_chunk_size() -> u64 {
    raisehub_core::config::MAX_CHUNK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[ledger]
rpc_url = "https://rpc.example.org"
max_retries = 3
poll_interval_secs = 4
confirmations = 2

[contracts]
registry = "0x1111111111111111111111111111111111111111"
factory = "0x2222222222222222222222222222222222222222"
market = "0x3333333333333333333333333333333333333333"

[discovery]
start_block = 1200
chunk_size = 5000
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.ledger.max_retries, 3);
        assert_eq!(config.ledger.confirmations, 2);
        assert_eq!(config.discovery.start_block, 1200);
        assert_eq!(config.discovery.chunk_size, 5000);
    }

    #[test]
    fn test_optional_sections_use_defaults() {
        let toml_str = r#"
[ledger]
rpc_url = "http://localhost:8545"

[contracts]
registry = "0x1111111111111111111111111111111111111111"
factory = "0x2222222222222222222222222222222222222222"
market = "0x3333333333333333333333333333333333333333"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.ledger.max_retries, 5);
        assert_eq!(config.ledger.poll_interval_secs, 12);
        assert_eq!(config.ledger.confirmations, 0);
        assert_eq!(config.discovery.start_block, 0);
        assert_eq!(config.discovery.chunk_size, 9000);
    }

    #[test]
    fn test_missing_contracts_is_an_error() {
        let toml_str = r#"
[ledger]
rpc_url = "http://localhost:8545"
"#;
        assert!(toml::from_str::<FileConfig>(toml_str).is_err());
    }
}
