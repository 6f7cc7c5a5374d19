use axum::{
    Json,
    extract::{Multipart, Query, State},
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::intake::{IdentificationRequest, stage_multipart};
use crate::models::{AppState, IdentifyResponse};

#[derive(Deserialize)]
pub struct NameQuery {
    pub name: Option<String>,
}

/// Look a plant up by name, skipping image recognition.
///
/// # Errors
///
/// 400 when `name` is missing or blank, before any outbound call.
pub async fn by_name(
    State(state): State<AppState>,
    Query(q): Query<NameQuery>,
) -> AppResult<Json<IdentifyResponse>> {
    let req = IdentificationRequest::by_name(q.name.as_deref())?;
    Ok(Json(state.pipeline.identify(req).await?))
}

/// Identify a plant from up to 5 photos.
///
/// Accepts a multipart form with repeated `images` file fields and an
/// optional parallel `organs` list.
///
/// # Errors
///
/// 400 for no/too many images, 413 for oversized files, then whatever the
/// pipeline reports.
pub async fn by_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<IdentifyResponse>> {
    let uploads = stage_multipart(&mut multipart, &state.upload_dir).await?;
    tracing::info!(
        files = uploads.images().len(),
        organs = ?uploads.images().iter().map(|i| i.organ.as_str()).collect::<Vec<_>>(),
        bytes = ?uploads.images().iter().map(|i| i.size).collect::<Vec<_>>(),
        "images received"
    );

    let req = IdentificationRequest::by_images(uploads)?;
    Ok(Json(state.pipeline.identify(req).await?))
}
