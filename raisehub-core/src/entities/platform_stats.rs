use crate::aggregate::{Overflow, StatsDelta, checked_count, checked_sum};
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use serde::Serialize;

/// Key of the single platform statistics row.
pub const PLATFORM_STATS_ID: &str = "global";

/// Platform-wide running totals, maintained incrementally by every handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_users: i64,
    pub total_founders: i64,
    pub total_investors: i64,
    pub total_rounds: i64,
    pub total_raised: Decimal,
    pub total_trades: i64,
    pub total_trade_volume: Decimal,
    pub updated_at: i64,
}

impl PlatformStats {
    /// Fold a delta into the totals. On overflow nothing is changed.
    pub fn apply(&mut self, delta: &StatsDelta, updated_at: i64) -> Result<(), Overflow> {
        *self = PlatformStats {
            total_users: checked_count("total_users", self.total_users, delta.users)?,
            total_founders: checked_count("total_founders", self.total_founders, delta.founders)?,
            total_investors: checked_count(
                "total_investors",
                self.total_investors,
                delta.investors,
            )?,
            total_rounds: checked_count("total_rounds", self.total_rounds, delta.rounds)?,
            total_raised: checked_sum("total_raised", self.total_raised, delta.raised)?,
            total_trades: checked_count("total_trades", self.total_trades, delta.trades)?,
            total_trade_volume: checked_sum(
                "total_trade_volume",
                self.total_trade_volume,
                delta.trade_volume,
            )?,
            updated_at,
        };
        Ok(())
    }

    pub async fn find(
        executor: impl sqlx::PgExecutor<'_>,
    ) -> Result<Option<PlatformStats>, sqlx::Error> {
        sqlx::query_as::<_, PlatformStats>(
            r#"
            SELECT total_users, total_founders, total_investors, total_rounds,
                   total_raised, total_trades, total_trade_volume, updated_at
            FROM platform_stats
            WHERE id = $1
            "#,
        )
        .bind(PLATFORM_STATS_ID)
        .fetch_optional(executor)
        .await
    }

    /// Add a delta to the singleton row without reading it first.
    ///
    /// The row is created on first use so a fresh database needs no seed.
    pub async fn add(
        executor: impl sqlx::PgExecutor<'_>,
        delta: &StatsDelta,
        updated_at: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO platform_stats AS s (
                id, total_users, total_founders, total_investors, total_rounds,
                total_raised, total_trades, total_trade_volume, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                total_users = s.total_users + EXCLUDED.total_users,
                total_founders = s.total_founders + EXCLUDED.total_founders,
                total_investors = s.total_investors + EXCLUDED.total_investors,
                total_rounds = s.total_rounds + EXCLUDED.total_rounds,
                total_raised = s.total_raised + EXCLUDED.total_raised,
                total_trades = s.total_trades + EXCLUDED.total_trades,
                total_trade_volume = s.total_trade_volume + EXCLUDED.total_trade_volume,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(PLATFORM_STATS_ID)
        .bind(delta.users)
        .bind(delta.founders)
        .bind(delta.investors)
        .bind(delta.rounds)
        .bind(delta.raised)
        .bind(delta.trades)
        .bind(delta.trade_volume)
        .bind(updated_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Read the platform statistics, or zeroes if nothing has been indexed yet.
pub struct GetPlatformStats;

impl Processor<GetPlatformStats> for DatabaseProcessor {
    type Output = PlatformStats;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPlatformStats")]
    async fn process(&self, _query: GetPlatformStats) -> Result<PlatformStats, sqlx::Error> {
        Ok(PlatformStats::find(&self.pool).await?.unwrap_or_default())
    }
}
