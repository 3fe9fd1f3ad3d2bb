//! Keyed, transactional storage for derived entities.
//!
//! Handlers only ever talk to a [`StoreTransaction`]. Everything written
//! through one transaction (entity rows, the platform statistics delta and
//! the checkpoint) becomes visible together on [`StoreTransaction::commit`],
//! or not at all if the transaction is dropped.
//!
//! Upserts are single atomic operations at the storage layer and report
//! whether they created the row, so "first sight" decisions do not depend on
//! a separate read.

pub mod memory;
pub mod postgres;

pub use memory::{MemorySnapshot, MemoryStore};
pub use postgres::PgEntityStore;

use crate::aggregate::{Overflow, StatsDelta};
use crate::entities::founder_profile::FounderProfile;
use crate::entities::investment::Investment;
use crate::entities::round::Round;
use crate::entities::sell_order::{SellOrder, SellOrderUpdate};
use crate::entities::trade::Trade;
use crate::entities::user::User;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by an entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A ledger quantity does not fit the column it is stored in
    #[error("value {value} out of range for {column}")]
    OutOfRange { column: &'static str, value: u64 },

    /// A running total no longer fits its column
    #[error(transparent)]
    Overflow(#[from] Overflow),

    /// The store refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Whether an upsert created the row or overwrote an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl UpsertOutcome {
    pub fn from_inserted(inserted: bool) -> Self {
        if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        }
    }

    pub fn is_inserted(self) -> bool {
        self == UpsertOutcome::Inserted
    }
}

/// Position of a log in the canonical ledger order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl LedgerPosition {
    pub const fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl std::fmt::Display for LedgerPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// Durable progress marker of the indexer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Last event whose effects have been fully committed.
    pub last_event: Option<LedgerPosition>,
    /// Last block whose logs have all been fetched and applied.
    pub synced_block: Option<u64>,
}

impl Checkpoint {
    /// Returns true if the event at `position` has already been applied.
    pub fn is_applied(&self, position: LedgerPosition) -> bool {
        self.last_event.is_some_and(|last| position <= last)
            || self.synced_block.is_some_and(|block| position.block_number <= block)
    }

    /// First block that still needs scanning, given a configured start block.
    pub fn resume_block(&self, start_block: u64) -> u64 {
        match self.synced_block {
            Some(block) => start_block.max(block.saturating_add(1)),
            None => start_block,
        }
    }
}

/// Factory for store transactions plus the few reads done outside one.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Open a new unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Read the last committed checkpoint.
    async fn checkpoint(&self) -> Result<Checkpoint, StoreError>;

    /// Addresses of every round recorded so far, in deployment order.
    async fn round_addresses(&self) -> Result<Vec<String>, StoreError>;
}

/// One unit of work against the store.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn find_user(&mut self, address: &str) -> Result<Option<User>, StoreError>;
    async fn upsert_user(&mut self, user: &User) -> Result<UpsertOutcome, StoreError>;

    async fn find_founder_profile(
        &mut self,
        address: &str,
    ) -> Result<Option<FounderProfile>, StoreError>;
    async fn upsert_founder_profile(
        &mut self,
        profile: &FounderProfile,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn find_round(&mut self, address: &str) -> Result<Option<Round>, StoreError>;
    async fn upsert_round(&mut self, round: &Round) -> Result<UpsertOutcome, StoreError>;

    async fn find_investment(&mut self, id: &str) -> Result<Option<Investment>, StoreError>;
    async fn upsert_investment(
        &mut self,
        investment: &Investment,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn find_sell_order(&mut self, order_id: &str) -> Result<Option<SellOrder>, StoreError>;
    /// Returns false if the order id already existed.
    async fn insert_sell_order(&mut self, order: &SellOrder) -> Result<bool, StoreError>;
    /// Returns false if no order matched.
    async fn update_sell_order(&mut self, update: &SellOrderUpdate) -> Result<bool, StoreError>;

    async fn find_trade(&mut self, id: &str) -> Result<Option<Trade>, StoreError>;
    /// Returns false if the trade id already existed.
    async fn insert_trade(&mut self, trade: &Trade) -> Result<bool, StoreError>;

    async fn apply_stats(&mut self, delta: &StatsDelta, updated_at: i64)
    -> Result<(), StoreError>;

    async fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// Make every write of this transaction durable.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_position_ordering() {
        assert!(LedgerPosition::new(10, 5) < LedgerPosition::new(11, 0));
        assert!(LedgerPosition::new(10, 1) < LedgerPosition::new(10, 2));
        assert_eq!(LedgerPosition::new(7, 3).to_string(), "7:3");
    }

    #[test]
    fn test_checkpoint_is_applied() {
        let empty = Checkpoint::default();
        assert!(!empty.is_applied(LedgerPosition::new(0, 0)));

        let checkpoint = Checkpoint {
            last_event: Some(LedgerPosition::new(100, 3)),
            synced_block: Some(99),
        };
        assert!(checkpoint.is_applied(LedgerPosition::new(99, 50)));
        assert!(checkpoint.is_applied(LedgerPosition::new(100, 3)));
        assert!(!checkpoint.is_applied(LedgerPosition::new(100, 4)));
        assert!(!checkpoint.is_applied(LedgerPosition::new(101, 0)));
    }

    #[test]
    fn test_checkpoint_resume_block() {
        assert_eq!(Checkpoint::default().resume_block(500), 500);

        let checkpoint = Checkpoint {
            last_event: None,
            synced_block: Some(800),
        };
        assert_eq!(checkpoint.resume_block(500), 801);
        assert_eq!(checkpoint.resume_block(900), 900);
    }
}
