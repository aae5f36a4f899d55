//! Video endpoints. The upload pipeline lives elsewhere; this module
//! only covers the watch-history write path.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::error::ApiError;
use super::types::ApiResponse;
use super::AppState;

/// `POST /api/videos/{video_id}/watched` — append the video to the
/// viewer's watch history.
pub async fn mark_watched(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(video_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let video = state
        .store()
        .get_video(video_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Video", video_id))?;

    state.store().record_watch(user.id, video.id).await?;

    tracing::debug!(user_id = user.id, video_id, "Watch recorded");

    Ok(Json(ApiResponse::<()>::ok_empty(
        "Watch history updated successfully",
    )))
}
