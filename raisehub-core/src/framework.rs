use sqlx::PgPool;

pub struct DatabaseProcessor {
    pub pool: PgPool,
}

pub struct TransactionProcessor<'b> {
    pub tx: sqlx::Transaction<'b, sqlx::Postgres>,
}

impl TransactionProcessor<'static> {
    /// Open a transaction on the pool.
    pub async fn begin(pool: &PgPool) -> Result<Self, sqlx::Error> {
        Ok(Self {
            tx: pool.begin().await?,
        })
    }
}

impl<'b> TransactionProcessor<'b> {
    /// Connection every statement of the transaction runs on.
    pub fn acquire(&mut self) -> &mut sqlx::PgConnection {
        &mut self.tx
    }

    /// Commit every write made through this processor.
    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }
}
