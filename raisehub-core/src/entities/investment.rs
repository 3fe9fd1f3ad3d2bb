use crate::framework::DatabaseProcessor;
use crate::store::UpsertOutcome;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use serde::Serialize;

/// Accumulated position of one investor in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Investment {
    /// `{round}-{investor}`
    pub id: String,
    pub round: String,
    pub investor: String,
    pub amount: Decimal,
    pub tokens: Decimal,
    pub first_invested_at: i64,
    pub updated_at: i64,
}

impl Investment {
    pub fn key(round: &str, investor: &str) -> String {
        format!("{round}-{investor}")
    }

    pub async fn find(
        executor: impl sqlx::PgExecutor<'_>,
        id: &str,
    ) -> Result<Option<Investment>, sqlx::Error> {
        sqlx::query_as::<_, Investment>(
            r#"
            SELECT id, round, investor, amount, tokens, first_invested_at, updated_at
            FROM investments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn upsert(
        executor: impl sqlx::PgExecutor<'_>,
        investment: &Investment,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO investments
                (id, round, investor, amount, tokens, first_invested_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                amount = EXCLUDED.amount,
                tokens = EXCLUDED.tokens,
                updated_at = EXCLUDED.updated_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&investment.id)
        .bind(&investment.round)
        .bind(&investment.investor)
        .bind(investment.amount)
        .bind(investment.tokens)
        .bind(investment.first_invested_at)
        .bind(investment.updated_at)
        .fetch_one(executor)
        .await?;
        Ok(UpsertOutcome::from_inserted(inserted))
    }
}

#[derive(Debug, Clone)]
/// List the investments made into a round, oldest first.
pub struct ListRoundInvestments {
    pub round: String,
}

impl Processor<ListRoundInvestments> for DatabaseProcessor {
    type Output = Vec<Investment>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListRoundInvestments")]
    async fn process(&self, query: ListRoundInvestments) -> Result<Vec<Investment>, sqlx::Error> {
        sqlx::query_as::<_, Investment>(
            r#"
            SELECT id, round, investor, amount, tokens, first_invested_at, updated_at
            FROM investments
            WHERE round = $1
            ORDER BY first_invested_at ASC, investor ASC
            "#,
        )
        .bind(&query.round)
        .fetch_all(&self.pool)
        .await
    }
}
