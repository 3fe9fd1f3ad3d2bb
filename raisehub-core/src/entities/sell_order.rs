use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use serde::Serialize;

/// A secondary-market sell order.
///
/// `amount` only ever decreases; once `active` is false the order is terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SellOrder {
    /// On-chain order id in decimal string form.
    pub order_id: String,
    pub seller: String,
    pub token_contract: String,
    /// Remaining amount for sale.
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub price_per_token: Decimal,
    pub expiry_time: i64,
    pub active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields a fill or cancellation is allowed to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellOrderUpdate {
    pub order_id: String,
    pub amount: Option<Decimal>,
    pub active: bool,
    pub updated_at: i64,
}

const SELL_ORDER_COLUMNS: &str = "order_id, seller, token_contract, amount, original_amount, \
    price_per_token, expiry_time, active, created_at, updated_at";

impl SellOrder {
    pub async fn find(
        executor: impl sqlx::PgExecutor<'_>,
        order_id: &str,
    ) -> Result<Option<SellOrder>, sqlx::Error> {
        sqlx::query_as::<_, SellOrder>(&format!(
            "SELECT {SELL_ORDER_COLUMNS} FROM sell_orders WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(executor)
        .await
    }

    /// Insert a new order. Returns false if the id already existed.
    pub async fn insert(
        executor: impl sqlx::PgExecutor<'_>,
        order: &SellOrder,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO sell_orders ({SELL_ORDER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (order_id) DO NOTHING
            "#
        ))
        .bind(&order.order_id)
        .bind(&order.seller)
        .bind(&order.token_contract)
        .bind(order.amount)
        .bind(order.original_amount)
        .bind(order.price_per_token)
        .bind(order.expiry_time)
        .bind(order.active)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply an update. Returns false if no order with that id exists.
    pub async fn update(
        executor: impl sqlx::PgExecutor<'_>,
        update: &SellOrderUpdate,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE sell_orders
            SET amount = COALESCE($2, amount),
                active = $3,
                updated_at = $4
            WHERE order_id = $1
            "#,
        )
        .bind(&update.order_id)
        .bind(update.amount)
        .bind(update.active)
        .bind(update.updated_at)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct GetSellOrder {
    pub order_id: String,
}

impl Processor<GetSellOrder> for DatabaseProcessor {
    type Output = Option<SellOrder>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetSellOrder")]
    async fn process(&self, query: GetSellOrder) -> Result<Option<SellOrder>, sqlx::Error> {
        SellOrder::find(&self.pool, &query.order_id).await
    }
}
