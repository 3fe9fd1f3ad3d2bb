use axum::{Json, extract::State, response::IntoResponse};
use kanau::processor::Processor;
use raisehub_core::entities::platform_stats::GetPlatformStats;

use super::ApiError;
use crate::state::AppState;

/// `GET /stats`
pub(super) async fn get_platform_stats(
    state: State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state
        .processor()
        .process(GetPlatformStats)
        .await
        .map_err(ApiError::Database)?;

    Ok(Json(stats))
}
