//! Sell orders and trades on the secondary market.

use super::{EventContext, EventHandler, EventTrigger, HandlerError};
use crate::aggregate::StatsDelta;
use crate::decoding::{ContractKind, DecodedEvent};
use crate::entities::sell_order::{SellOrder, SellOrderUpdate};
use crate::entities::trade::Trade;
use crate::store::StoreTransaction;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, warn};

pub struct SecondaryMarketHandler;

/// Fields of an `OrderExecuted` event.
struct Execution<'a> {
    order_id: &'a str,
    buyer: &'a str,
    seller: &'a str,
    amount: Decimal,
    price_per_token: Decimal,
    total_price: Decimal,
    platform_fee: Decimal,
}

impl SecondaryMarketHandler {
    #[allow(clippy::too_many_arguments)]
    async fn created(
        ctx: &EventContext,
        order_id: &str,
        seller: &str,
        token_contract: &str,
        amount: Decimal,
        price_per_token: Decimal,
        expiry_time: i64,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let order = SellOrder {
            order_id: order_id.to_string(),
            seller: seller.to_string(),
            token_contract: token_contract.to_string(),
            amount,
            original_amount: amount,
            price_per_token,
            expiry_time,
            active: amount > Decimal::ZERO,
            created_at: ctx.block_timestamp,
            updated_at: ctx.block_timestamp,
        };
        if !tx.insert_sell_order(&order).await? {
            warn!(order_id, block = ctx.block_number, "Order id reused, keeping the first order");
        }
        Ok(StatsDelta::default())
    }

    async fn executed(
        ctx: &EventContext,
        execution: Execution<'_>,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let order = tx.find_sell_order(execution.order_id).await?;
        if order.is_none() {
            warn!(
                order_id = execution.order_id,
                block = ctx.block_number,
                log_index = ctx.log_index,
                "Execution against unknown order"
            );
        }

        let trade = Trade {
            id: Trade::key(&ctx.tx_hash, ctx.log_index),
            order_id: execution.order_id.to_string(),
            buyer: execution.buyer.to_string(),
            seller: execution.seller.to_string(),
            token_contract: order
                .as_ref()
                .map(|o| o.token_contract.clone())
                .unwrap_or_default(),
            amount: execution.amount,
            price_per_token: execution.price_per_token,
            total_price: execution.total_price,
            platform_fee: execution.platform_fee,
            block_number: ctx.block_number_i64()?,
            log_index: ctx.log_index_i64()?,
            timestamp: ctx.block_timestamp,
            tx_hash: ctx.tx_hash.clone(),
        };
        if !tx.insert_trade(&trade).await? {
            warn!(trade = %trade.id, "Trade already recorded");
            return Ok(StatsDelta::default());
        }

        if let Some(order) = order {
            let remaining = (order.amount - execution.amount).max(Decimal::ZERO);
            let active = order.active && remaining > Decimal::ZERO;
            tx.update_sell_order(&SellOrderUpdate {
                order_id: order.order_id,
                amount: Some(remaining),
                active,
                updated_at: ctx.block_timestamp,
            })
            .await?;
            debug!(order_id = execution.order_id, %remaining, active, "Order filled");
        }

        Ok(StatsDelta::trade_executed(execution.total_price))
    }

    async fn cancelled(
        ctx: &EventContext,
        order_id: &str,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        let matched = tx
            .update_sell_order(&SellOrderUpdate {
                order_id: order_id.to_string(),
                amount: None,
                active: false,
                updated_at: ctx.block_timestamp,
            })
            .await?;
        if !matched {
            debug!(order_id, "Cancellation of unknown order ignored");
        }
        Ok(StatsDelta::default())
    }
}

#[async_trait]
impl EventHandler for SecondaryMarketHandler {
    fn name(&self) -> &'static str {
        "secondary_market"
    }

    fn triggers(&self) -> Vec<EventTrigger> {
        vec![
            EventTrigger::new(ContractKind::Market, "OrderCreated"),
            EventTrigger::new(ContractKind::Market, "OrderExecuted"),
            EventTrigger::new(ContractKind::Market, "OrderCancelled"),
        ]
    }

    async fn handle(
        &self,
        ctx: &EventContext,
        event: &DecodedEvent,
        tx: &mut dyn StoreTransaction,
    ) -> Result<StatsDelta, HandlerError> {
        match event {
            DecodedEvent::OrderCreated {
                order_id,
                seller,
                token_contract,
                amount,
                price_per_token,
                expiry_time,
            } => {
                Self::created(
                    ctx,
                    order_id,
                    seller,
                    token_contract,
                    *amount,
                    *price_per_token,
                    *expiry_time,
                    tx,
                )
                .await
            }
            DecodedEvent::OrderExecuted {
                order_id,
                buyer,
                seller,
                amount,
                price_per_token,
                total_price,
                platform_fee,
            } => {
                let execution = Execution {
                    order_id,
                    buyer,
                    seller,
                    amount: *amount,
                    price_per_token: *price_per_token,
                    total_price: *total_price,
                    platform_fee: *platform_fee,
                };
                Self::executed(ctx, execution, tx).await
            }
            DecodedEvent::OrderCancelled { order_id } => Self::cancelled(ctx, order_id, tx).await,
            other => Err(HandlerError::Unsupported {
                handler: self.name(),
                event: other.name(),
            }),
        }
    }
}
