//! Account endpoints: registration, login, logout, token refresh,
//! password change, channel profiles, and watch history.

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse},
};
use std::sync::Arc;

use super::auth::{self, CurrentUser, REFRESH_COOKIE};
use super::error::ApiError;
use super::types::{
    ApiResponse, ChangePasswordRequest, ChannelProfileDto, LoginRequest, LoginResponse,
    RefreshRequest, TokenPairDto, UserDto, WatchHistoryEntryDto,
};
use super::AppState;
use crate::db::NewUser;
use crate::services::TokenPair;

struct RegistrationForm {
    full_name: String,
    username: String,
    email: String,
    password: String,
    avatar: Option<(String, Bytes)>,
    cover_image: Option<(String, Bytes)>,
}

impl RegistrationForm {
    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self {
            full_name: String::new(),
            username: String::new(),
            email: String::new(),
            password: String::new(),
            avatar: None,
            cover_image: None,
        };

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "fullName" => form.full_name = read_text(field).await?,
                "username" => form.username = read_text(field).await?,
                "email" => form.email = read_text(field).await?,
                "password" => form.password = read_text(field).await?,
                "avatar" => form.avatar = Some(read_file(field).await?),
                "coverImage" => form.cover_image = Some(read_file(field).await?),
                _ => {}
            }
        }

        Ok(form)
    }

    fn validate(&self) -> Result<(), ApiError> {
        let required = [
            ("fullName", &self.full_name),
            ("username", &self.username),
            ("email", &self.email),
            ("password", &self.password),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ApiError::validation(format!("{name} is required")));
            }
        }

        if !self.email.contains('@') {
            return Err(ApiError::validation("email is not a valid address"));
        }

        if self.avatar.is_none() {
            return Err(ApiError::validation("avatar file is required"));
        }

        Ok(())
    }
}

/// The uniqueness pre-check and the insert are not atomic; a racing
/// registration lands here as a unique-index violation, which is still
/// a conflict, not a server fault.
fn conflict_on_unique(err: anyhow::Error) -> ApiError {
    match err
        .downcast_ref::<sea_orm::DbErr>()
        .and_then(sea_orm::DbErr::sql_err)
    {
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_)) => ApiError::Conflict(
            "User with this username or email already exists".to_string(),
        ),
        _ => ApiError::from(err),
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))
}

async fn read_file(
    field: axum::extract::multipart::Field<'_>,
) -> Result<(String, Bytes), ApiError> {
    let file_name = field.file_name().unwrap_or("upload.bin").to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?;
    Ok((file_name, bytes))
}

/// `POST /api/users/register`
pub async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let form = RegistrationForm::from_multipart(multipart).await?;
    form.validate()?;

    if state
        .store()
        .username_or_email_taken(&form.username, &form.email)
        .await?
    {
        return Err(ApiError::Conflict(
            "User with this username or email already exists".to_string(),
        ));
    }

    // Uploads go out before the row is written: a dead media store must
    // not leave a half-registered account behind.
    let (avatar_name, avatar_bytes) = form.avatar.as_ref().ok_or_else(|| {
        ApiError::validation("avatar file is required")
    })?;
    let avatar = state
        .media()
        .store(avatar_name, avatar_bytes)
        .await
        .map_err(|e| ApiError::media_store_error(e.to_string()))?;

    let cover_image = match &form.cover_image {
        Some((name, bytes)) => Some(
            state
                .media()
                .store(name, bytes)
                .await
                .map_err(|e| ApiError::media_store_error(e.to_string()))?,
        ),
        None => None,
    };

    let user = state
        .store()
        .create_user(
            NewUser {
                username: form.username,
                email: form.email,
                password: form.password,
                full_name: form.full_name,
                avatar,
                cover_image,
            },
            &state.config().security,
        )
        .await
        .map_err(conflict_on_unique)?;

    tracing::info!(user_id = user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::created(
            UserDto::from(user),
            "User registered successfully",
        )),
    ))
}

/// `POST /api/users/login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let identifier = request
        .username
        .as_deref()
        .or(request.email.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::validation("username or email is required"))?;

    let user = state
        .store()
        .get_user_by_identifier(identifier)
        .await?
        .ok_or_else(|| ApiError::NotFound("User does not exist".to_string()))?;

    if !state
        .store()
        .verify_user_password(user.id, &request.password)
        .await?
    {
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let pair = state.tokens().issue_pair(user.id).await?;

    tracing::info!(user_id = user.id, "User logged in");

    let cookies = pair_set_cookies(&state, &pair);
    let body = LoginResponse {
        user: UserDto::from(user),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    };

    Ok((
        cookies,
        Json(ApiResponse::ok(body, "User logged in successfully")),
    ))
}

/// `POST /api/users/logout`
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    state.tokens().revoke(user.id).await?;

    tracing::info!(user_id = user.id, "User logged out");

    let [access, refresh] = auth::removal_cookies();
    let cookies = AppendHeaders([
        (header::SET_COOKIE, access),
        (header::SET_COOKIE, refresh),
    ]);

    Ok((
        cookies,
        Json(ApiResponse::<()>::ok_empty("User logged out successfully")),
    ))
}

/// `POST /api/users/refresh-token`
///
/// The presented token is taken from the `refreshToken` cookie, then a
/// JSON body, then the `Authorization: Bearer` header. Any verification
/// failure comes back as the same 401.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let presented = extract_refresh_token(&headers, &body)
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    let pair = state.tokens().rotate_from_refresh(&presented).await?;

    let cookies = pair_set_cookies(&state, &pair);
    let body = TokenPairDto {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    };

    Ok((
        cookies,
        Json(ApiResponse::ok(body, "Access token refreshed")),
    ))
}

fn extract_refresh_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for cookie in cookie::Cookie::split_parse(raw).flatten() {
            if cookie.name() == REFRESH_COOKIE && !cookie.value().is_empty() {
                return Some(cookie.value().to_string());
            }
        }
    }

    if let Ok(request) = serde_json::from_slice::<RefreshRequest>(body)
        && let Some(token) = request.refresh_token
        && !token.trim().is_empty()
    {
        return Some(token.trim().to_string());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION)
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
        && !token.trim().is_empty()
    {
        return Some(token.trim().to_string());
    }

    None
}

/// `POST /api/users/change-password`
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if request.new_password.trim().is_empty() {
        return Err(ApiError::validation("newPassword is required"));
    }

    if !state
        .store()
        .verify_user_password(user.id, &request.old_password)
        .await?
    {
        return Err(ApiError::unauthorized("Invalid old password"));
    }

    state
        .store()
        .update_user_password(user.id, &request.new_password, &state.config().security)
        .await?;

    tracing::info!(user_id = user.id, "Password changed");

    Ok(Json(ApiResponse::<()>::ok_empty(
        "Password changed successfully",
    )))
}

/// `GET /api/users/c/{username}` — public channel profile with live
/// subscription counts; `isSubscribed` reflects the viewer when one is
/// authenticated and is `false` for anonymous viewers.
pub async fn channel_profile(
    State(state): State<Arc<AppState>>,
    viewer: Option<Extension<CurrentUser>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::validation("username is required"));
    }

    let channel = state
        .store()
        .get_user_by_username(&username)
        .await?
        .ok_or_else(|| ApiError::NotFound("Channel does not exist".to_string()))?;

    let viewer_id = viewer.map(|Extension(CurrentUser(user))| user.id);
    let stats = state.store().channel_stats(channel.id, viewer_id).await?;

    let profile = ChannelProfileDto {
        username: channel.username,
        full_name: channel.full_name,
        avatar: channel.avatar,
        cover_image: channel.cover_image,
        subscribers_count: stats.subscribers,
        subscribed_to_count: stats.subscribed_to,
        is_subscribed: stats.is_subscribed,
    };

    Ok(Json(ApiResponse::ok(
        profile,
        "Channel profile fetched successfully",
    )))
}

/// `GET /api/users/history` — watched videos in watch order, each
/// carrying its owner's public projection.
pub async fn watch_history(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let entries: Vec<WatchHistoryEntryDto> = state
        .store()
        .watch_history(user.id)
        .await?
        .into_iter()
        .map(WatchHistoryEntryDto::from)
        .collect();

    Ok(Json(ApiResponse::ok(
        entries,
        "Watch history fetched successfully",
    )))
}

fn pair_set_cookies(
    state: &AppState,
    pair: &TokenPair,
) -> AppendHeaders<[(header::HeaderName, String); 2]> {
    let auth_config = &state.config().auth;
    let [access, refresh] = auth::pair_cookies(
        pair,
        auth_config.access_ttl_minutes * 60,
        auth_config.refresh_ttl_days * 24 * 60 * 60,
        state.config().server.secure_cookies,
    );

    AppendHeaders([
        (header::SET_COOKIE, access),
        (header::SET_COOKIE, refresh),
    ])
}
