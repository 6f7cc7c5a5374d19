use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};

use crate::error::{AppError, AppResult};
use crate::intake::Coordinates;
use crate::models::{AppState, RecommendRequest, RecommendationData};

/// Suggest plants that suit a location.
///
/// # Errors
///
/// 400 when the body isn't JSON or the coordinates are missing/out of range.
pub async fn recommend(
    State(state): State<AppState>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> AppResult<Json<RecommendationData>> {
    let Json(req) = payload.map_err(|e| AppError::Msg(StatusCode::BAD_REQUEST, e.body_text()))?;
    let at = Coordinates::try_from(req)?;
    Ok(Json(state.pipeline.recommend(&at).await?))
}
