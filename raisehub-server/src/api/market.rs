use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use kanau::processor::Processor;
use raisehub_core::entities::sell_order::GetSellOrder;
use raisehub_core::entities::trade::{GetTrade, ListOrderTrades};

use super::ApiError;
use crate::state::AppState;

/// `GET /orders/{order_id}`
pub(super) async fn get_sell_order(
    state: State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let order = state
        .processor()
        .process(GetSellOrder { order_id })
        .await
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(order))
}

/// `GET /orders/{order_id}/trades`, in ledger order.
pub(super) async fn list_order_trades(
    state: State<AppState>,
    Path(order_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let trades = state
        .processor()
        .process(ListOrderTrades { order_id })
        .await
        .map_err(ApiError::Database)?;

    Ok(Json(trades))
}

/// `GET /trades/{trade_id}`
pub(super) async fn get_trade(
    state: State<AppState>,
    Path(trade_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // Trade ids embed a transaction hash, which is stored lowercased.
    let trade = state
        .processor()
        .process(GetTrade {
            id: trade_id.to_lowercase(),
        })
        .await
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(trade))
}
