use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use kanau::processor::Processor;
use raisehub_core::entities::investment::ListRoundInvestments;
use raisehub_core::entities::normalize_address;
use raisehub_core::entities::round::GetRound;

use super::ApiError;
use crate::state::AppState;

/// `GET /rounds/{address}`
pub(super) async fn get_round(
    state: State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let round = state
        .processor()
        .process(GetRound {
            address: normalize_address(&address),
        })
        .await
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(round))
}

/// `GET /rounds/{address}/investments`, oldest investment first.
///
/// An unknown round yields an empty list rather than 404, since
/// investments can be recorded before the round itself is.
pub(super) async fn list_round_investments(
    state: State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let investments = state
        .processor()
        .process(ListRoundInvestments {
            round: normalize_address(&address),
        })
        .await
        .map_err(ApiError::Database)?;

    Ok(Json(investments))
}
