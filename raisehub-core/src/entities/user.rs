use crate::entities::Role;
use crate::framework::DatabaseProcessor;
use crate::store::UpsertOutcome;
use kanau::processor::Processor;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Lowercased account address.
    pub address: String,
    pub role: Role,
    pub zk_verified: bool,
    pub nullifier_hash: Option<String>,
    /// Block timestamp of the event that created the user.
    pub registered_at: i64,
    pub updated_at: i64,
}

impl User {
    pub async fn find(
        executor: impl sqlx::PgExecutor<'_>,
        address: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT address, role, zk_verified, nullifier_hash, registered_at, updated_at
            FROM users
            WHERE address = $1
            "#,
        )
        .bind(address)
        .fetch_optional(executor)
        .await
    }

    /// Insert or overwrite the user row in one statement.
    ///
    /// `registered_at` is never overwritten once set.
    pub async fn upsert(
        executor: impl sqlx::PgExecutor<'_>,
        user: &User,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO users
                (address, role, zk_verified, nullifier_hash, registered_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (address) DO UPDATE SET
                role = EXCLUDED.role,
                zk_verified = EXCLUDED.zk_verified,
                nullifier_hash = EXCLUDED.nullifier_hash,
                updated_at = EXCLUDED.updated_at
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(&user.address)
        .bind(user.role)
        .bind(user.zk_verified)
        .bind(&user.nullifier_hash)
        .bind(user.registered_at)
        .bind(user.updated_at)
        .fetch_one(executor)
        .await?;
        Ok(UpsertOutcome::from_inserted(inserted))
    }
}

#[derive(Debug, Clone)]
/// Look up a user by lowercased address.
pub struct GetUser {
    pub address: String,
}

impl Processor<GetUser> for DatabaseProcessor {
    type Output = Option<User>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetUser")]
    async fn process(&self, query: GetUser) -> Result<Option<User>, sqlx::Error> {
        User::find(&self.pool, &query.address).await
    }
}
