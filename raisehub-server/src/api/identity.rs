use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use kanau::processor::Processor;
use raisehub_core::entities::founder_profile::GetFounderProfile;
use raisehub_core::entities::normalize_address;
use raisehub_core::entities::user::GetUser;

use super::ApiError;
use crate::state::AppState;

/// `GET /users/{address}`
pub(super) async fn get_user(
    state: State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .processor()
        .process(GetUser {
            address: normalize_address(&address),
        })
        .await
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(user))
}

/// `GET /founders/{address}`
pub(super) async fn get_founder_profile(
    state: State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = state
        .processor()
        .process(GetFounderProfile {
            address: normalize_address(&address),
        })
        .await
        .map_err(ApiError::Database)?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(profile))
}
