//! PostgreSQL-backed entity store.

use super::{
    Checkpoint, EntityStore, LedgerPosition, StoreError, StoreTransaction, UpsertOutcome,
};
use crate::aggregate::StatsDelta;
use crate::entities::founder_profile::FounderProfile;
use crate::entities::investment::Investment;
use crate::entities::platform_stats::PlatformStats;
use crate::entities::round::Round;
use crate::entities::sell_order::{SellOrder, SellOrderUpdate};
use crate::entities::trade::Trade;
use crate::entities::user::User;
use crate::framework::TransactionProcessor;
use async_trait::async_trait;
use sqlx::PgPool;

/// Key of the single checkpoint row.
const CHECKPOINT_ID: &str = "indexer";

/// Entity store over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CheckpointRow {
    last_block: Option<i64>,
    last_log_index: Option<i64>,
    synced_block: Option<i64>,
}

impl From<CheckpointRow> for Checkpoint {
    fn from(row: CheckpointRow) -> Self {
        let last_event = match (row.last_block, row.last_log_index) {
            (Some(block), Some(index)) => Some(LedgerPosition::new(
                u64::try_from(block).unwrap_or_default(),
                u64::try_from(index).unwrap_or_default(),
            )),
            _ => None,
        };
        Checkpoint {
            last_event,
            synced_block: row
                .synced_block
                .and_then(|block| u64::try_from(block).ok()),
        }
    }
}

fn to_i64(column: &'static str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange { column, value })
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let inner = TransactionProcessor::begin(&self.pool).await?;
        Ok(Box::new(PgStoreTransaction { inner }))
    }

    #[tracing::instrument(skip_all, err, name = "SQL:GetCheckpoint")]
    async fn checkpoint(&self) -> Result<Checkpoint, StoreError> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT last_block, last_log_index, synced_block
            FROM indexer_checkpoints
            WHERE id = $1
            "#,
        )
        .bind(CHECKPOINT_ID)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Checkpoint::from).unwrap_or_default())
    }

    #[tracing::instrument(skip_all, err, name = "SQL:ListRoundAddresses")]
    async fn round_addresses(&self) -> Result<Vec<String>, StoreError> {
        Ok(Round::list_addresses(&self.pool).await?)
    }
}

/// A store transaction backed by a PostgreSQL transaction.
///
/// Dropping it without calling `commit` rolls everything back.
pub struct PgStoreTransaction {
    inner: TransactionProcessor<'static>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn find_user(&mut self, address: &str) -> Result<Option<User>, StoreError> {
        Ok(User::find(self.inner.acquire(), address).await?)
    }

    async fn upsert_user(&mut self, user: &User) -> Result<UpsertOutcome, StoreError> {
        Ok(User::upsert(self.inner.acquire(), user).await?)
    }

    async fn find_founder_profile(
        &mut self,
        address: &str,
    ) -> Result<Option<FounderProfile>, StoreError> {
        Ok(FounderProfile::find(self.inner.acquire(), address).await?)
    }

    async fn upsert_founder_profile(
        &mut self,
        profile: &FounderProfile,
    ) -> Result<UpsertOutcome, StoreError> {
        Ok(FounderProfile::upsert(self.inner.acquire(), profile).await?)
    }

    async fn find_round(&mut self, address: &str) -> Result<Option<Round>, StoreError> {
        Ok(Round::find(self.inner.acquire(), address).await?)
    }

    async fn upsert_round(&mut self, round: &Round) -> Result<UpsertOutcome, StoreError> {
        Ok(Round::upsert(self.inner.acquire(), round).await?)
    }

    async fn find_investment(&mut self, id: &str) -> Result<Option<Investment>, StoreError> {
        Ok(Investment::find(self.inner.acquire(), id).await?)
    }

    async fn upsert_investment(
        &mut self,
        investment: &Investment,
    ) -> Result<UpsertOutcome, StoreError> {
        Ok(Investment::upsert(self.inner.acquire(), investment).await?)
    }

    async fn find_sell_order(&mut self, order_id: &str) -> Result<Option<SellOrder>, StoreError> {
        Ok(SellOrder::find(self.inner.acquire(), order_id).await?)
    }

    async fn insert_sell_order(&mut self, order: &SellOrder) -> Result<bool, StoreError> {
        Ok(SellOrder::insert(self.inner.acquire(), order).await?)
    }

    async fn update_sell_order(&mut self, update: &SellOrderUpdate) -> Result<bool, StoreError> {
        Ok(SellOrder::update(self.inner.acquire(), update).await?)
    }

    async fn find_trade(&mut self, id: &str) -> Result<Option<Trade>, StoreError> {
        Ok(Trade::find(self.inner.acquire(), id).await?)
    }

    async fn insert_trade(&mut self, trade: &Trade) -> Result<bool, StoreError> {
        Ok(Trade::insert(self.inner.acquire(), trade).await?)
    }

    async fn apply_stats(
        &mut self,
        delta: &StatsDelta,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        Ok(PlatformStats::add(self.inner.acquire(), delta, updated_at).await?)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:SaveCheckpoint")]
    async fn save_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let last_block = checkpoint
            .last_event
            .map(|p| to_i64("last_block", p.block_number))
            .transpose()?;
        let last_log_index = checkpoint
            .last_event
            .map(|p| to_i64("last_log_index", p.log_index))
            .transpose()?;
        let synced_block = checkpoint
            .synced_block
            .map(|b| to_i64("synced_block", b))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO indexer_checkpoints (id, last_block, last_log_index, synced_block)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                last_block = EXCLUDED.last_block,
                last_log_index = EXCLUDED.last_log_index,
                synced_block = EXCLUDED.synced_block
            "#,
        )
        .bind(CHECKPOINT_ID)
        .bind(last_block)
        .bind(last_log_index)
        .bind(synced_block)
        .execute(self.inner.acquire())
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        Ok(self.inner.commit().await?)
    }
}
