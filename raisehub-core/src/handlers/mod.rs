//! Transformation rules from decoded events to entity mutations.
//!
//! A handler reads and writes entities through the [`StoreTransaction`] it
//! is given and returns the [`StatsDelta`] its writes imply. It never commits
//! and never touches the platform totals itself.

pub mod identity;
pub mod round_lifecycle;
pub mod secondary_market;

pub use identity::IdentityHandler;
pub use round_lifecycle::RoundLifecycleHandler;
pub use secondary_market::SecondaryMarketHandler;

use crate::aggregate::{Overflow, StatsDelta};
use crate::decoding::{ContractKind, DecodedEvent};
use crate::store::{LedgerPosition, StoreError, StoreTransaction};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An entity total no longer fits a decimal.
    #[error(transparent)]
    Overflow(#[from] Overflow),

    /// The router sent an event the handler never subscribed to.
    #[error("{handler} does not handle {event}")]
    Unsupported {
        handler: &'static str,
        event: &'static str,
    },
}

/// Ledger metadata of the log being handled.
///
/// All timestamps written by handlers come from here, never from the clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    /// Lowercased address of the emitting contract.
    pub contract: String,
    pub block_number: u64,
    pub block_timestamp: i64,
    pub tx_hash: String,
    pub log_index: u64,
}

impl EventContext {
    pub fn position(&self) -> LedgerPosition {
        LedgerPosition::new(self.block_number, self.log_index)
    }

    /// Block number as stored in `BIGINT` columns.
    pub fn block_number_i64(&self) -> Result<i64, StoreError> {
        i64::try_from(self.block_number).map_err(|_| StoreError::OutOfRange {
            column: "block_number",
            value: self.block_number,
        })
    }

    pub fn log_index_i64(&self) -> Result<i64, StoreError> {
        i64::try_from(self.log_index).map_err(|_| StoreError::OutOfRange {
            column: "log_index",
            value: self.log_index,
        })
    }
}

/// Which (contract kind, event name) pair a handler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTrigger {
    pub source: ContractKind,
    pub event: &'static str,
}

impl EventTrigger {
    pub const fn new(source: ContractKind, event: &'static str) -> Self {
        Self { source, event }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    fn triggers(&self) -> Vec<EventTrigger>;

    async fn handle(
        &self,
        ctx: &EventContext,
        event: &DecodedEvent,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::EventContext;

    /// Context for a log at `block:log_index` with a deterministic tx hash.
    pub fn ctx(contract: &str, block_number: u64, log_index: u64) -> EventContext {
        EventContext {
            contract: contract.to_string(),
            block_number,
            block_timestamp: 1_700_000_000 + block_number as i64 * 12,
            tx_hash: format!("0x{block_number:064x}"),
            log_index,
        }
    }
}
