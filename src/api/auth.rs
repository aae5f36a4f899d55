use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use cookie::{Cookie, SameSite};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::db::User;
use crate::services::TokenPair;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Identity resolved by the session guard, attached to the request as
/// an extension and read by downstream handlers as an explicit value.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

// ============================================================================
// Middleware
// ============================================================================

/// Session guard for routes that require authentication. Token sources,
/// in order: `accessToken` cookie, then `Authorization: Bearer`.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_identity(&state, request.headers())
        .await?
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    request.extensions_mut().insert(CurrentUser(user));

    Ok(next.run(request).await)
}

/// Session guard for routes that allow anonymous access: a verifiable
/// token attaches the identity, an absent or unverifiable one passes
/// through with none. Storage failures are still errors — a database
/// outage must not quietly demote authenticated viewers to anonymous.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(user) = resolve_identity(&state, request.headers()).await? {
        request.extensions_mut().insert(CurrentUser(user));
    }

    Ok(next.run(request).await)
}

/// Verify the access token and load the (sanitized) identity it names.
/// `Ok(None)` means no usable credential was presented.
async fn resolve_identity(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Option<User>, ApiError> {
    let Some(token) = extract_bearer(headers, ACCESS_COOKIE) else {
        return Ok(None);
    };

    let Ok(user_id) = state.tokens().verify_access(&token) else {
        return Ok(None);
    };

    // A valid signature for a deleted account still resolves to no identity.
    let user = state.store().get_user_by_id(user_id).await?;

    Ok(user)
}

/// Extract a bearer token from the named cookie first, then from the
/// `Authorization: Bearer` header.
pub fn extract_bearer(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        for cookie in Cookie::split_parse(raw).flatten() {
            if cookie.name() == cookie_name && !cookie.value().is_empty() {
                return Some(cookie.value().to_string());
            }
        }
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

// ============================================================================
// Cookie helpers
// ============================================================================

fn token_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(
            i64::try_from(max_age_secs).unwrap_or(i64::MAX),
        ))
        .build()
        .to_string()
}

/// Set-Cookie values carrying a freshly issued token pair.
pub fn pair_cookies(pair: &TokenPair, access_ttl_secs: u64, refresh_ttl_secs: u64, secure: bool) -> [String; 2] {
    [
        token_cookie(ACCESS_COOKIE, &pair.access_token, access_ttl_secs, secure),
        token_cookie(REFRESH_COOKIE, &pair.refresh_token, refresh_ttl_secs, secure),
    ]
}

/// Set-Cookie values that expire both token cookies immediately.
pub fn removal_cookies() -> [String; 2] {
    [ACCESS_COOKIE, REFRESH_COOKIE].map(|name| {
        let mut cookie = Cookie::new(name, "");
        cookie.set_path("/");
        cookie.make_removal();
        cookie.to_string()
    })
}
