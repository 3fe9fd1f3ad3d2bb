use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use serde::Serialize;

/// An executed fill against a sell order. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// `{txHash}-{logIndex}`
    pub id: String,
    pub order_id: String,
    pub buyer: String,
    pub seller: String,
    /// Empty when the order was never seen.
    pub token_contract: String,
    pub amount: Decimal,
    pub price_per_token: Decimal,
    pub total_price: Decimal,
    pub platform_fee: Decimal,
    pub block_number: i64,
    pub log_index: i64,
    pub timestamp: i64,
    pub tx_hash: String,
}

const TRADE_COLUMNS: &str = "id, order_id, buyer, seller, token_contract, amount, \
    price_per_token, total_price, platform_fee, block_number, log_index, timestamp, tx_hash";

impl Trade {
    pub fn key(tx_hash: &str, log_index: u64) -> String {
        format!("{tx_hash}-{log_index}")
    }

    pub async fn find(
        executor: impl sqlx::PgExecutor<'_>,
        id: &str,
    ) -> Result<Option<Trade>, sqlx::Error> {
        sqlx::query_as::<_, Trade>(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Insert a trade. Returns false if a trade with the same id exists.
    pub async fn insert(
        executor: impl sqlx::PgExecutor<'_>,
        trade: &Trade,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO trades ({TRADE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO NOTHING
            "#
        ))
        .bind(&trade.id)
        .bind(&trade.order_id)
        .bind(&trade.buyer)
        .bind(&trade.seller)
        .bind(&trade.token_contract)
        .bind(trade.amount)
        .bind(trade.price_per_token)
        .bind(trade.total_price)
        .bind(trade.platform_fee)
        .bind(trade.block_number)
        .bind(trade.log_index)
        .bind(trade.timestamp)
        .bind(&trade.tx_hash)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct GetTrade {
    pub id: String,
}

impl Processor<GetTrade> for DatabaseProcessor {
    type Output = Option<Trade>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetTrade")]
    async fn process(&self, query: GetTrade) -> Result<Option<Trade>, sqlx::Error> {
        Trade::find(&self.pool, &query.id).await
    }
}

#[derive(Debug, Clone)]
/// Trades executed against one order, in ledger order.
pub struct ListOrderTrades {
    pub order_id: String,
}

impl Processor<ListOrderTrades> for DatabaseProcessor {
    type Output = Vec<Trade>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListOrderTrades")]
    async fn process(&self, query: ListOrderTrades) -> Result<Vec<Trade>, sqlx::Error> {
        sqlx::query_as::<_, Trade>(&format!(
            r#"
            SELECT {TRADE_COLUMNS} FROM trades
            WHERE order_id = $1
            ORDER BY block_number ASC, log_index ASC
            "#
        ))
        .bind(&query.order_id)
        .fetch_all(&self.pool)
        .await
    }
}
