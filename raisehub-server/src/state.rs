//! Application state shared across all request handlers.

use raisehub_core::framework::DatabaseProcessor;
use sqlx::PgPool;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
}

impl AppState {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Processor for the read-only entity queries.
    pub fn processor(&self) -> DatabaseProcessor {
        DatabaseProcessor {
            pool: self.db.clone(),
        }
    }
}
