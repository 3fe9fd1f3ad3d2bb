use crate::entities::RoundState;
use crate::framework::DatabaseProcessor;
use crate::store::UpsertOutcome;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use serde::Serialize;

/// A fundraising round, one per contract deployed by the round factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    /// Lowercased round contract address.
    pub address: String,
    pub founder: String,
    pub target_raise: Decimal,
    pub metadata_uri: String,
    pub total_raised: Decimal,
    pub total_withdrawn: Decimal,
    pub tokens_issued: Decimal,
    pub investor_count: i64,
    pub state: RoundState,
    pub deployed_block: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

const ROUND_COLUMNS: &str = "address, founder, target_raise, metadata_uri, total_raised, \
    total_withdrawn, tokens_issued, investor_count, state, deployed_block, created_at, updated_at";

impl Round {
    pub async fn find(
        executor: impl sqlx::PgExecutor<'_>,
        address: &str,
    ) -> Result<Option<Round>, sqlx::Error> {
        sqlx::query_as::<_, Round>(&format!(
            "SELECT {ROUND_COLUMNS} FROM rounds WHERE address = $1"
        ))
        .bind(address)
        .fetch_optional(executor)
        .await
    }

    /// Every known round address in deployment order.
    pub async fn list_addresses(
        executor: impl sqlx::PgExecutor<'_>,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT address
            FROM rounds
            ORDER BY deployed_block ASC, address ASC
            "#,
        )
        .fetch_all(executor)
        .await
    }

    pub async fn upsert(
        executor: impl sqlx::PgExecutor<'_>,
        round: &Round,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        let inserted = sqlx::query_scalar::<_, bool>(&format!(
            r#"
            INSERT INTO rounds ({ROUND_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (address) DO UPDATE SET
                founder = EXCLUDED.founder,
                target_raise = EXCLUDED.target_raise,
                metadata_uri = EXCLUDED.metadata_uri,
                total_raised = EXCLUDED.total_raised,
                total_withdrawn = EXCLUDED.total_withdrawn,
                tokens_issued = EXCLUDED.tokens_issued,
                investor_count = EXCLUDED.investor_count,
                state = EXCLUDED.state,
                updated_at = EXCLUDED.updated_at
            RETURNING (xmax = 0) AS inserted
            "#
        ))
        .bind(&round.address)
        .bind(&round.founder)
        .bind(round.target_raise)
        .bind(&round.metadata_uri)
        .bind(round.total_raised)
        .bind(round.total_withdrawn)
        .bind(round.tokens_issued)
        .bind(round.investor_count)
        .bind(round.state)
        .bind(round.deployed_block)
        .bind(round.created_at)
        .bind(round.updated_at)
        .fetch_one(executor)
        .await?;
        Ok(UpsertOutcome::from_inserted(inserted))
    }
}

#[derive(Debug, Clone)]
pub struct GetRound {
    pub address: String,
}

impl Processor<GetRound> for DatabaseProcessor {
    type Output = Option<Round>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetRound")]
    async fn process(&self, query: GetRound) -> Result<Option<Round>, sqlx::Error> {
        Round::find(&self.pool, &query.address).await
    }
}
