use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::{Any, CorsLayer}, services::ServeDir, trace::TraceLayer};

pub mod auth;
pub mod error;
pub mod subscriptions;
pub mod types;
pub mod users;
pub mod videos;

pub use error::ApiError;
pub use types::ApiResponse;

use crate::config::Config;
use crate::db::Store;
use crate::services::{LocalMediaStore, MediaStore, TokenService};

pub struct AppState {
    config: Config,
    store: Store,
    tokens: TokenService,
    media: Arc<dyn MediaStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Store,
        tokens: TokenService,
        media: Arc<dyn MediaStore>,
    ) -> Self {
        Self {
            config,
            store,
            tokens,
            media,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn media(&self) -> &dyn MediaStore {
        self.media.as_ref()
    }
}

/// Wire up storage and services from a loaded configuration.
pub async fn create_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let tokens = TokenService::new(store.clone(), &config.auth);
    let media: Arc<dyn MediaStore> = Arc::new(LocalMediaStore::new(&config.media.storage_path));

    Ok(Arc::new(AppState::new(config, store, tokens, media)))
}

pub fn router(state: Arc<AppState>) -> Router {
    let require_auth = middleware::from_fn_with_state(state.clone(), auth::require_auth);
    let optional_auth = middleware::from_fn_with_state(state.clone(), auth::optional_auth);

    let user_routes = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/refresh-token", post(users::refresh_token))
        .route(
            "/c/{username}",
            get(users::channel_profile).route_layer(optional_auth),
        )
        .merge(
            Router::new()
                .route("/logout", post(users::logout))
                .route("/change-password", post(users::change_password))
                .route("/history", get(users::watch_history))
                .route_layer(require_auth.clone()),
        );

    let subscription_routes = Router::new()
        .route(
            "/c/{channel_id}",
            get(subscriptions::subscriber_count).merge(
                post(subscriptions::toggle).route_layer(require_auth.clone()),
            ),
        )
        .route(
            "/u/{subscriber_id}",
            get(subscriptions::subscribed_channel_count),
        );

    let video_routes = Router::new()
        .route("/{video_id}/watched", post(videos::mark_watched))
        .route_layer(require_auth);

    let media_dir = state.config().media.storage_path.clone();

    Router::new()
        .route("/health", get(health))
        .nest("/api/users", user_routes)
        .nest("/api/subscriptions", subscription_routes)
        .nest("/api/videos", video_routes)
        .nest_service("/media", ServeDir::new(media_dir))
        .fallback(not_found)
        .layer(cors_layer(&state.config().server.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .store()
        .ping()
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(ApiResponse::ok(
        serde_json::json!({ "status": "ok" }),
        "Service healthy",
    )))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error(404, "Resource not found")),
    )
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::COOKIE]);

    if allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(origins).allow_credentials(true)
    }
}
