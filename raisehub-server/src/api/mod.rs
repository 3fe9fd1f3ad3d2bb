//! Read-only query API over the indexed entities.
//!
//! # Endpoints
//!
//! - `GET /users/{address}`              – user by address
//! - `GET /founders/{address}`           – founder profile by address
//! - `GET /rounds/{address}`             – round by contract address
//! - `GET /rounds/{address}/investments` – investments into a round
//! - `GET /orders/{order_id}`            – sell order by on-chain id
//! - `GET /orders/{order_id}/trades`     – trades against a sell order
//! - `GET /trades/{trade_id}`            – trade by `{txHash}-{logIndex}`
//! - `GET /stats`                        – platform totals
//!
//! Addresses are matched case-insensitively.

use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};

use crate::state::AppState;

mod identity;
mod market;
mod rounds;
mod stats;

/// Build the query API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{address}", get(identity::get_user))
        .route("/founders/{address}", get(identity::get_founder_profile))
        .route("/rounds/{address}", get(rounds::get_round))
        .route(
            "/rounds/{address}/investments",
            get(rounds::list_round_investments),
        )
        .route("/orders/{order_id}", get(market::get_sell_order))
        .route("/orders/{order_id}/trades", get(market::list_order_trades))
        .route("/trades/{trade_id}", get(market::get_trade))
        .route("/stats", get(stats::get_platform_stats))
}

/// Errors that can occur in query API handlers.
#[derive(Debug)]
pub(crate) enum ApiError {
    Database(sqlx::Error),
    NotFound,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::Database(e) => {
                tracing::error!(error = %e, "Query API database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
            ApiError::NotFound => (StatusCode::NOT_FOUND, "resource not found").into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Database(sqlx::Error::RowNotFound)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
