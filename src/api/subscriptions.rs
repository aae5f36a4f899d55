//! Subscription graph endpoints: toggle plus the two count views.

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::error::ApiError;
use super::types::{ApiResponse, SubscribedChannelCountDto, SubscriberCountDto, ToggleDto};
use super::AppState;
use crate::db::ToggleState;

/// `POST /api/subscriptions/c/{channel_id}` — flip the viewer's
/// subscription to the channel and report the resulting state.
pub async fn toggle(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(channel_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    if channel_id == user.id {
        return Err(ApiError::validation("Cannot subscribe to your own channel"));
    }

    let channel = state
        .store()
        .get_user_by_id(channel_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel", channel_id))?;

    let toggled = state.store().toggle_subscription(user.id, channel.id).await?;

    tracing::debug!(
        subscriber_id = user.id,
        channel_id,
        state = toggled.as_str(),
        "Subscription toggled"
    );

    let message = match toggled {
        ToggleState::Subscribed => "Subscribed successfully",
        ToggleState::Unsubscribed => "Unsubscribed successfully",
    };

    Ok(Json(ApiResponse::ok(
        ToggleDto {
            state: toggled.as_str(),
        },
        message,
    )))
}

/// `GET /api/subscriptions/c/{channel_id}` — how many subscribers the
/// channel has.
pub async fn subscriber_count(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = state
        .store()
        .get_user_by_id(channel_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Channel", channel_id))?;

    let subscribers = state.store().count_subscribers(channel.id).await?;

    Ok(Json(ApiResponse::ok(
        SubscriberCountDto { subscribers },
        "Subscriber count fetched successfully",
    )))
}

/// `GET /api/subscriptions/u/{subscriber_id}` — how many channels the
/// user is subscribed to.
pub async fn subscribed_channel_count(
    State(state): State<Arc<AppState>>,
    Path(subscriber_id): Path<i32>,
) -> Result<impl IntoResponse, ApiError> {
    let subscriber = state
        .store()
        .get_user_by_id(subscriber_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User", subscriber_id))?;

    let subscribed_channels = state.store().count_subscriptions(subscriber.id).await?;

    Ok(Json(ApiResponse::ok(
        SubscribedChannelCountDto {
            subscribed_channels,
        },
        "Subscribed channel count fetched successfully",
    )))
}
