//! Runtime configuration for the indexer.
//!
//! These types hold already-validated values. Reading and validating the
//! TOML file is the server crate's job.

use crate::ledger::RetryConfig;
use alloy::primitives::Address;
use std::time::Duration;
use url::Url;

/// Upper bound for a single `eth_getLogs` block range.
pub const MAX_CHUNK_SIZE: u64 = 9000;

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub ledger: LedgerConfig,
    pub contracts: ContractsConfig,
    pub discovery: DiscoveryConfig,
}

/// Ledger connection settings.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: Url,
    pub retry: RetryConfig,
    /// Sleep between polls once the indexer has caught up with the head.
    pub poll_interval: Duration,
    /// Blocks behind the head that are treated as final.
    pub confirmations: u64,
}

/// Statically known contract addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractsConfig {
    pub registry: Address,
    pub factory: Address,
    pub market: Address,
}

/// Backfill parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// First block that may contain platform events.
    pub start_block: u64,
    /// Inclusive window width for log queries, at most [`MAX_CHUNK_SIZE`].
    pub chunk_size: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            chunk_size: MAX_CHUNK_SIZE,
        }
    }
}
