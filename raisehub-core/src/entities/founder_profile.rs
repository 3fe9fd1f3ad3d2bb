use crate::framework::DatabaseProcessor;
use crate::store::UpsertOutcome;
use kanau::processor::Processor;
use serde::Serialize;

/// Off-chain profile pointer published by a founder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FounderProfile {
    pub address: String,
    pub metadata_uri: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Hash of the transaction that last touched the profile.
    pub last_tx_hash: String,
}

impl FounderProfile {
    pub async fn find(
        executor: impl sqlx::PgExecutor<'_>,
        address: &str,
    ) -> Result<Option<FounderProfile>, sqlx::Error> {
        sqlx::query_as::<_, FounderProfile>(
            r#"
            SELECT address, metadata_uri, created_at, updated_at, last_tx_hash
            FROM founder_profiles
            WHERE address = $1
            "#,
        )
        .bind(address)
        .fetch_optional(executor)
        .await
    }

    pub async fn upsert(
        executor: impl sqlx::PgExecutor<'_>,
        profile: &FounderProfile,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO founder_profiles
                (address, metadata_uri, created_at, updated_at, last_tx_hash)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (address) DO UPDATE SET
                metadata_uri = EXCLUDED.metadata_uri,
                updated_at = EXCLUDED.updated_at,
                last_tx_hash = EXCLUDED.last_tx_hash
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&profile.address)
        .bind(&profile.metadata_uri)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .bind(&profile.last_tx_hash)
        .fetch_one(executor)
        .await?;
        Ok(UpsertOutcome::from_inserted(inserted))
    }
}

#[derive(Debug, Clone)]
pub struct GetFounderProfile {
    pub address: String,
}

impl Processor<GetFounderProfile> for DatabaseProcessor {
    type Output = Option<FounderProfile>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetFounderProfile")]
    async fn process(
        &self,
        query: GetFounderProfile,
    ) -> Result<Option<FounderProfile>, sqlx::Error> {
        FounderProfile::find(&self.pool, &query.address).await
    }
}
