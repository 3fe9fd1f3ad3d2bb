//! Boundary to the ledger node.
//!
//! The indexer only needs three things from the chain: the current head,
//! logs for a set of addresses over a block range, and block timestamps.

#[cfg(test)]
pub(crate) mod scripted;
pub mod retry;
pub mod rpc;

pub use retry::{RetryConfig, with_retry};
pub use rpc::RpcLedgerClient;

use crate::store::LedgerPosition;
use alloy::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Block {0} not found")]
    BlockNotFound(u64),

    #[error("Log is missing {0}")]
    IncompleteLog(&'static str),
}

impl LedgerError {
    /// Check if this error is likely transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Transport(_) => true,
            LedgerError::Provider(msg) => Self::is_retryable_message(msg),
            // The node may simply not have the block yet
            LedgerError::BlockNotFound(_) => true,
            LedgerError::IncompleteLog(_) => false,
        }
    }

    fn is_retryable_message(msg: &str) -> bool {
        let msg_lower = msg.to_lowercase();
        msg_lower.contains("connection")
            || msg_lower.contains("timeout")
            || msg_lower.contains("timed out")
            || msg_lower.contains("reset")
            || msg_lower.contains("rate limit")
            || msg_lower.contains("too many requests")
            || msg_lower.contains("429")
            || msg_lower.contains("502")
            || msg_lower.contains("503")
            || msg_lower.contains("504")
            || msg_lower.contains("temporarily")
            || msg_lower.contains("try again")
    }
}

/// A log as returned by the node, already bound to its ledger position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    /// Present when the node includes it in `eth_getLogs` results.
    pub block_timestamp: Option<u64>,
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl RawLog {
    pub fn position(&self) -> LedgerPosition {
        LedgerPosition::new(self.block_number, self.log_index)
    }

    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }
}

/// Inclusive block range query over one or more contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub addresses: Vec<Address>,
    /// Matches any of these `topic0` values; empty means every event.
    pub event_signatures: Vec<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogQuery {
    pub fn new(addresses: Vec<Address>, from_block: u64, to_block: u64) -> Self {
        Self {
            addresses,
            event_signatures: Vec::new(),
            from_block,
            to_block,
        }
    }

    pub fn with_event(mut self, signature: B256) -> Self {
        self.event_signatures.push(signature);
        self
    }
}

/// Read access to the ledger.
///
/// Timeouts, retries and rate limiting belong to implementations.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current head block height.
    async fn block_number(&self) -> Result<u64, LedgerError>;

    /// Logs matching the query, in any order.
    async fn logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, LedgerError>;

    /// Unix timestamp of a block.
    async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(LedgerError::Transport("reset".into()).is_retryable());
        assert!(LedgerError::Provider("429 Too Many Requests".into()).is_retryable());
        assert!(
            !LedgerError::Provider("query returned more than 10000 results".into())
                .is_retryable()
        );
        assert!(!LedgerError::IncompleteLog("log index").is_retryable());
    }

    #[test]
    fn test_log_query_builder() {
        let query = LogQuery::new(vec![Address::ZERO], 10, 20).with_event(B256::ZERO);
        assert_eq!(query.from_block, 10);
        assert_eq!(query.to_block, 20);
        assert_eq!(query.event_signatures, vec![B256::ZERO]);
    }
}
