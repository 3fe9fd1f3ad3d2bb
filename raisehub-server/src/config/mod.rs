//! Configuration module for raisehub-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::FileConfig;
use alloy::primitives::Address;
use raisehub_core::config::{
    ContractsConfig, DiscoveryConfig, IndexerConfig, LedgerConfig, MAX_CHUNK_SIZE,
};
use raisehub_core::ledger::RetryConfig;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// HTTP server settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub indexer: IndexerConfig,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read, override, validate and convert the configuration file.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let file_config: FileConfig = toml::from_str(&config_content)?;
        self.build(file_config)
    }

    fn build(&self, mut file_config: FileConfig) -> Result<LoadedConfig, ConfigError> {
        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        let contracts = ContractsConfig {
            registry: parse_address("registry", &file_config.contracts.registry)?,
            factory: parse_address("factory", &file_config.contracts.factory)?,
            market: parse_address("market", &file_config.contracts.market)?,
        };
        if contracts.registry == contracts.factory
            || contracts.registry == contracts.market
            || contracts.factory == contracts.market
        {
            return Err(ConfigError::ValidationError(
                "registry, factory and market must be distinct contracts".to_string(),
            ));
        }

        let chunk_size = file_config.discovery.chunk_size;
        if !(1..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(ConfigError::ValidationError(format!(
                "discovery.chunk_size must be between 1 and {MAX_CHUNK_SIZE}, got {chunk_size}"
            )));
        }

        let rpc_url = Url::parse(&file_config.ledger.rpc_url).map_err(|e| {
            ConfigError::ValidationError(format!("ledger.rpc_url is not a valid URL: {e}"))
        })?;
        if file_config.ledger.poll_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "ledger.poll_interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: file_config.server.listen,
            },
            indexer: IndexerConfig {
                ledger: LedgerConfig {
                    rpc_url,
                    retry: RetryConfig::new(file_config.ledger.max_retries),
                    poll_interval: Duration::from_secs(file_config.ledger.poll_interval_secs),
                    confirmations: file_config.ledger.confirmations,
                },
                contracts,
                discovery: DiscoveryConfig {
                    start_block: file_config.discovery.start_block,
                    chunk_size,
                },
            },
        })
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address, ConfigError> {
    Address::from_str(value.trim()).map_err(|e| {
        ConfigError::ValidationError(format!("contracts.{field} is not a valid address: {e}"))
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
[ledger]
rpc_url = "http://localhost:8545"
max_retries = 2

[contracts]
registry = "0x1111111111111111111111111111111111111111"
factory = "0x2222222222222222222222222222222222222222"
market = "0x3333333333333333333333333333333333333333"

[discovery]
start_block = 77
chunk_size = 2000
"#;

    fn build(toml_str: &str, listen: Option<SocketAddr>) -> Result<LoadedConfig, ConfigError> {
        let file_config: FileConfig = toml::from_str(toml_str)?;
        ConfigLoader::new("unused.toml", listen).build(file_config)
    }

    #[test]
    fn test_valid_config_converts() {
        let loaded = build(VALID, None).unwrap();
        assert_eq!(loaded.indexer.discovery.start_block, 77);
        assert_eq!(loaded.indexer.discovery.chunk_size, 2000);
        assert_eq!(loaded.indexer.ledger.retry.max_retries, 2);
        assert_eq!(
            loaded.indexer.contracts.factory,
            Address::repeat_byte(0x22)
        );
    }

    #[test]
    fn test_listen_override_applies() {
        let listen: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = build(VALID, Some(listen)).unwrap();
        assert_eq!(loaded.server.listen, listen);
    }

    #[test]
    fn test_chunk_size_bounds() {
        let too_big = VALID.replace("chunk_size = 2000", "chunk_size = 9001");
        assert!(matches!(
            build(&too_big, None),
            Err(ConfigError::ValidationError(_))
        ));
        let zero = VALID.replace("chunk_size = 2000", "chunk_size = 0");
        assert!(matches!(
            build(&zero, None),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_bad_and_shared_addresses() {
        let bad = VALID.replace(
            "0x3333333333333333333333333333333333333333",
            "0x33",
        );
        assert!(matches!(
            build(&bad, None),
            Err(ConfigError::ValidationError(_))
        ));

        let shared = VALID.replace(
            "0x3333333333333333333333333333333333333333",
            "0x2222222222222222222222222222222222222222",
        );
        assert!(matches!(
            build(&shared, None),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejects_bad_rpc_url() {
        let bad = VALID.replace("http://localhost:8545", "not a url");
        assert!(matches!(
            build(&bad, None),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
