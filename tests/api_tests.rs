use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;
use vidtube::api::AppState;
use vidtube::config::Config;

const BOUNDARY: &str = "test-boundary-7MA4YWxkTrZu0gW";

async fn spawn_app() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    // A pooled in-memory sqlite is one database per connection; keep the
    // pool at a single connection so every query sees the migrated schema.
    config.general.max_db_connections = 1;
    config.general.min_db_connections = 1;
    config.server.secure_cookies = false;
    config.media.storage_path = std::env::temp_dir()
        .join(format!("vidtube-test-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();

    let state = vidtube::api::create_app_state(config)
        .await
        .expect("Failed to create app state");
    (vidtube::api::router(state.clone()), state)
}

fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    for (name, filename, bytes) in files {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn register(app: &Router, username: &str, email: &str) -> axum::response::Response {
    let body = multipart_body(
        &[
            ("fullName", "Test User"),
            ("username", username),
            ("email", email),
            ("password", "password123"),
        ],
        &[("avatar", "avatar.png", b"fake png bytes")],
    );

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users/register")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "username": username, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Register + login, returning (user_id, access_token, refresh_token).
async fn register_and_login(app: &Router, username: &str, email: &str) -> (i64, String, String) {
    let response = register(app, username, email).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let user_id = body["data"]["id"].as_i64().unwrap();

    let response = login(app, username, "password123").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let access = body["data"]["accessToken"].as_str().unwrap().to_string();
    let refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();

    (user_id, access, refresh)
}

async fn authed_request(
    app: &Router,
    method: &str,
    uri: &str,
    token: &str,
    body: Option<serde_json::Value>,
) -> axum::response::Response {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_register_and_login_flow() {
    let (app, _state) = spawn_app().await;

    let response = register(&app, "Alice", "alice@example.com").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["statusCode"], 201);
    assert_eq!(body["success"], true);
    // Usernames are canonicalized to lowercase on registration.
    assert_eq!(body["data"]["username"], "alice");
    assert_eq!(body["data"]["email"], "alice@example.com");
    assert!(body["data"]["avatar"].as_str().unwrap().starts_with("/media/"));
    assert!(body["data"].get("password").is_none());
    assert!(body["data"].get("passwordHash").is_none());

    let response = login(&app, "alice", "password123").await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=") && c.contains("HttpOnly")));
    assert!(cookies.iter().any(|c| c.starts_with("refreshToken=") && c.contains("HttpOnly")));

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert!(body["data"]["accessToken"].as_str().is_some());
    assert!(body["data"]["refreshToken"].as_str().is_some());
    assert_eq!(body["data"]["user"]["username"], "alice");
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_missing_fields() {
    let (app, _state) = spawn_app().await;

    let response = register(&app, "bob", "bob@example.com").await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Same username, different email.
    let response = register(&app, "bob", "bob2@example.com").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["statusCode"], 409);

    // No avatar file.
    let body = multipart_body(
        &[
            ("fullName", "No Avatar"),
            ("username", "noavatar"),
            ("email", "noavatar@example.com"),
            ("password", "password123"),
        ],
        &[],
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users/register")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_racing_duplicate_registration_is_a_conflict() {
    let (app, state) = spawn_app().await;

    let new_user = |email: &str| vidtube::db::NewUser {
        username: "gina".to_string(),
        email: email.to_string(),
        password: "password123".to_string(),
        full_name: "Gina".to_string(),
        avatar: "/media/a.png".to_string(),
        cover_image: None,
    };

    state
        .store()
        .create_user(new_user("gina@example.com"), &state.config().security)
        .await
        .unwrap();

    // A second insert past the uniqueness pre-check hits the unique
    // index; the handler maps that to 409, so the classification the
    // mapping relies on must hold.
    let err = state
        .store()
        .create_user(new_user("gina2@example.com"), &state.config().security)
        .await
        .unwrap_err();
    let sql_err = err
        .downcast_ref::<sea_orm::DbErr>()
        .and_then(sea_orm::DbErr::sql_err);
    assert!(matches!(
        sql_err,
        Some(sea_orm::SqlErr::UniqueConstraintViolation(_))
    ));

    // And the route still reports the conflict.
    let response = register(&app, "gina", "gina3@example.com").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_login_failures() {
    let (app, _state) = spawn_app().await;
    register(&app, "carol", "carol@example.com").await;

    let response = login(&app, "carol", "wrong-password").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = login(&app, "nobody", "password123").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/users/history")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/users/history")
                .header(header::AUTHORIZATION, "Bearer not-a-real-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_rotation_invalidates_old_token() {
    let (app, _state) = spawn_app().await;
    let (_, _, refresh) = register_and_login(&app, "dave", "dave@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users/refresh-token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "refreshToken": refresh }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let new_refresh = body["data"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh);

    // The superseded token must be dead.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users/refresh-token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "refreshToken": refresh }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The rotated one still works, via cookie this time.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users/refresh-token")
                .header(header::COOKIE, format!("refreshToken={new_refresh}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let (app, _state) = spawn_app().await;
    let (_, access, refresh) = register_and_login(&app, "erin", "erin@example.com").await;

    let response = authed_request(&app, "POST", "/api/users/logout", &access, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookies: Vec<String> = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("accessToken=")));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/users/refresh-token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "refreshToken": refresh }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_change_password() {
    let (app, _state) = spawn_app().await;
    let (_, access, _) = register_and_login(&app, "frank", "frank@example.com").await;

    // A wrong old password is a credential failure, not a malformed request.
    let response = authed_request(
        &app,
        "POST",
        "/api/users/change-password",
        &access,
        Some(serde_json::json!({ "oldPassword": "wrong", "newPassword": "newpassword1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = authed_request(
        &app,
        "POST",
        "/api/users/change-password",
        &access,
        Some(serde_json::json!({ "oldPassword": "password123", "newPassword": "newpassword1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = login(&app, "frank", "password123").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = login(&app, "frank", "newpassword1").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_subscription_toggle_and_counts() {
    let (app, _state) = spawn_app().await;
    let (channel_id, _, _) = register_and_login(&app, "channel", "channel@example.com").await;
    let (viewer_id, viewer_access, _) =
        register_and_login(&app, "viewer", "viewer@example.com").await;

    let uri = format!("/api/subscriptions/c/{channel_id}");

    // Anonymous toggles are rejected.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Subscribing to yourself is not a thing.
    let self_uri = format!("/api/subscriptions/c/{viewer_id}");
    let response = authed_request(&app, "POST", &self_uri, &viewer_access, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = authed_request(&app, "POST", &uri, &viewer_access, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["state"], "subscribed");

    let response = authed_request(&app, "POST", &uri, &viewer_access, None).await;
    let body = json_body(response).await;
    assert_eq!(body["data"]["state"], "unsubscribed");

    let response = authed_request(&app, "POST", &uri, &viewer_access, None).await;
    let body = json_body(response).await;
    assert_eq!(body["data"]["state"], "subscribed");

    let response = app
        .clone()
        .oneshot(Request::builder().uri(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["subscribers"], 1);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/subscriptions/u/{viewer_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"]["subscribedChannels"], 1);

    // Missing channel.
    let response = authed_request(&app, "POST", "/api/subscriptions/c/9999", &viewer_access, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_channel_profile_reflects_viewer() {
    let (app, _state) = spawn_app().await;
    let (channel_id, _, _) = register_and_login(&app, "creator", "creator@example.com").await;
    let (_, viewer_access, _) = register_and_login(&app, "fan", "fan@example.com").await;

    let toggle_uri = format!("/api/subscriptions/c/{channel_id}");
    authed_request(&app, "POST", &toggle_uri, &viewer_access, None).await;

    // Authenticated viewer sees their own subscription state.
    let response = authed_request(&app, "GET", "/api/users/c/creator", &viewer_access, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["username"], "creator");
    assert_eq!(body["data"]["subscribersCount"], 1);
    assert_eq!(body["data"]["isSubscribed"], true);

    // Anonymous viewers get the same profile with isSubscribed false.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/users/c/creator")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["subscribersCount"], 1);
    assert_eq!(body["data"]["isSubscribed"], false);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/users/c/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_watch_history_order_and_owner_projection() {
    let (app, state) = spawn_app().await;
    let (owner_id, _, _) = register_and_login(&app, "owner", "owner@example.com").await;
    let (_, watcher_access, _) = register_and_login(&app, "watcher", "watcher@example.com").await;

    let first = state
        .store()
        .add_video("First Video", "/media/t1.png", 120.0, owner_id as i32)
        .await
        .unwrap();
    let second = state
        .store()
        .add_video("Second Video", "/media/t2.png", 300.5, owner_id as i32)
        .await
        .unwrap();

    for video_id in [second, first] {
        let response = authed_request(
            &app,
            "POST",
            &format!("/api/videos/{video_id}/watched"),
            &watcher_access,
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response =
        authed_request(&app, "POST", "/api/videos/9999/watched", &watcher_access, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = authed_request(&app, "GET", "/api/users/history", &watcher_access, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    // Entries come back in watch order.
    assert_eq!(entries[0]["id"].as_i64().unwrap(), i64::from(second));
    assert_eq!(entries[0]["title"], "Second Video");
    assert_eq!(entries[1]["id"].as_i64().unwrap(), i64::from(first));

    let owner = &entries[0]["owner"];
    assert_eq!(owner["username"], "owner");
    assert_eq!(owner["fullName"], "Test User");
    assert!(owner["avatar"].as_str().unwrap().starts_with("/media/"));
    assert!(owner.get("email").is_none());
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _state) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["status"], "ok");
}
