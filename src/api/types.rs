use serde::{Deserialize, Serialize};

use crate::db::{User, WatchHistoryRow};

/// Uniform response envelope: `success` is derived from the status code,
/// never set independently, so a failure can't masquerade as a success.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub data: Option<T>,
    pub message: String,
    pub success: bool,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self::with_status(200, Some(data), message)
    }

    pub fn created(data: T, message: impl Into<String>) -> Self {
        Self::with_status(201, Some(data), message)
    }

    pub fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self::with_status(status_code, None, message)
    }

    pub fn ok_empty(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse::with_status(200, None, message)
    }

    fn with_status(status_code: u16, data: Option<T>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            data,
            message: message.into(),
            success: status_code < 400,
        }
    }
}

/// Public profile projection. Built from the repository's sanitized
/// `User`, which never carries the password hash or refresh token.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            avatar: user.avatar,
            cover_image: user.cover_image,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserDto,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairDto {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfileDto {
    pub username: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub subscribers_count: i64,
    pub subscribed_to_count: i64,
    pub is_subscribed: bool,
}

#[derive(Debug, Serialize)]
pub struct ToggleDto {
    pub state: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SubscriberCountDto {
    pub subscribers: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribedChannelCountDto {
    pub subscribed_channels: i64,
}

/// Minimal owner projection embedded in each watch-history entry —
/// exactly these three fields, nothing else about the owner leaks out.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerDto {
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchHistoryEntryDto {
    pub id: i32,
    pub title: String,
    pub thumbnail: String,
    pub duration: f64,
    pub views: i64,
    pub owner: OwnerDto,
}

impl From<WatchHistoryRow> for WatchHistoryEntryDto {
    fn from(row: WatchHistoryRow) -> Self {
        Self {
            id: row.video_id,
            title: row.title,
            thumbnail: row.thumbnail,
            duration: row.duration,
            views: row.views,
            owner: OwnerDto {
                username: row.owner_username,
                full_name: row.owner_full_name,
                avatar: row.owner_avatar,
            },
        }
    }
}
