//! Application-level tests: admin seeding, router assembly and a full user journey.

use crate::{
    Application, create_initial_admin_user,
    auth::password,
    db::handlers::{Repository, Users},
    db::models::users::UserUpdateDBRequest,
    test_utils::*,
    types::Role,
};
use axum::http::StatusCode;
use serde_json::{Value, json};
use sqlx::SqlitePool;

fn admin_config(username: &str) -> crate::Config {
    let mut config = create_test_config();
    config.admin.username = username.to_string();
    config.admin.email = format!("{username}@example.com");
    config
}

#[sqlx::test]
#[test_log::test]
async fn test_create_initial_admin_user_new_user(pool: SqlitePool) {
    let config = admin_config("rootadmin");

    let mut conn = pool.acquire().await.unwrap();
    assert!(Users::new(&mut conn).get_user_by_username("rootadmin").await.unwrap().is_none());

    let admin = create_initial_admin_user(&config, "admin-password-1", &pool, false)
        .await
        .expect("Should create admin user successfully");

    let stored = Users::new(&mut conn)
        .get_user_by_username("rootadmin")
        .await
        .unwrap()
        .expect("Admin should exist");
    assert_eq!(stored.id, admin.id);
    assert_eq!(stored.email, "rootadmin@example.com");
    assert_eq!(stored.role, Role::Admin);
    assert!(stored.is_active);
    assert!(password::verify_string("admin-password-1", &stored.password_hash).unwrap());
}

#[sqlx::test]
#[test_log::test]
async fn test_create_initial_admin_user_existing_user(pool: SqlitePool) {
    let config = admin_config("rootadmin");
    let first = create_initial_admin_user(&config, "admin-password-1", &pool, false).await.unwrap();

    let second = create_initial_admin_user(&config, "a-different-password", &pool, false)
        .await
        .expect("Should handle existing user successfully");

    assert_eq!(second.id, first.id);
    assert!(
        password::verify_string("admin-password-1", &second.password_hash).unwrap(),
        "an existing admin keeps their password without reset"
    );
}

#[sqlx::test]
#[test_log::test]
async fn test_create_initial_admin_user_reset(pool: SqlitePool) {
    let config = admin_config("rootadmin");
    let first = create_initial_admin_user(&config, "admin-password-1", &pool, false).await.unwrap();

    let mut conn = pool.acquire().await.unwrap();
    Users::new(&mut conn)
        .update(
            first.id,
            &UserUpdateDBRequest {
                is_active: Some(false),
                role: Some(Role::User),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let reset = create_initial_admin_user(&config, "new-admin-password", &pool, true).await.unwrap();

    assert_eq!(reset.id, first.id);
    assert!(reset.is_active);
    assert_eq!(reset.role, Role::Admin);
    assert!(password::verify_string("new-admin-password", &reset.password_hash).unwrap());
}

#[sqlx::test]
#[test_log::test]
async fn test_openapi_json_and_docs_are_served(pool: SqlitePool) {
    let server = create_test_app(pool).await;

    let response = server.get("/api/v1/openapi.json").await;
    response.assert_status_ok();
    let content = response.text();
    assert!(content.contains("\"openapi\""));
    assert!(content.contains("Zoe API"));
    assert!(content.contains("/groups/{group_id}/members"));

    server.get("/api/v1/docs").await.assert_status_ok();
}

#[sqlx::test]
#[test_log::test]
async fn test_cors_headers_on_api_routes(pool: SqlitePool) {
    let server = create_test_app(pool).await;

    let response = server.get("/api/v1/health").add_header("origin", "https://app.example.com").await;

    response.assert_status_ok();
    assert_eq!(
        response.headers().get("access-control-allow-origin").and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[sqlx::test]
#[test_log::test]
async fn test_cors_explicit_origin_list(pool: SqlitePool) {
    let mut config = create_test_config();
    config.cors.allowed_origins = vec![crate::config::CorsOrigin::Url(
        "https://app.example.com".parse().unwrap(),
    )];
    config.cors.allow_credentials = true;
    let server = create_test_app_with_config(pool, config).await;

    let allowed = server.get("/api/v1/health").add_header("origin", "https://app.example.com").await;
    assert_eq!(
        allowed.headers().get("access-control-allow-origin").and_then(|v| v.to_str().ok()),
        Some("https://app.example.com")
    );
    assert_eq!(
        allowed.headers().get("access-control-allow-credentials").and_then(|v| v.to_str().ok()),
        Some("true")
    );

    let denied = server.get("/api/v1/health").add_header("origin", "https://evil.example.com").await;
    assert!(denied.headers().get("access-control-allow-origin").is_none());
}

#[sqlx::test]
#[test_log::test]
async fn test_application_seeds_configured_admin(pool: SqlitePool) {
    let mut config = admin_config("seededadmin");
    config.admin.password = Some("seeded-password".to_string());

    let app = Application::new_with_pool(config, Some(pool.clone()))
        .await
        .expect("Failed to create application");
    let server = app.into_test_server();

    let response = server
        .post("/api/v1/auth/login")
        .json(&json!({ "username": "seededadmin", "password": "seeded-password" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["data"]["user"]["role"], "admin");
}

/// A moderator logs in, builds a group around a regular user and notifies them; the user then
/// reads the notification with their own session token and logs out.
#[sqlx::test]
#[test_log::test]
async fn test_e2e_group_and_notification_flow(pool: SqlitePool) {
    let server = create_test_app(pool.clone()).await;
    let moderator = create_test_user(&pool, Role::Moderator).await;
    let member = create_test_user(&pool, Role::User).await;

    let login = |username: String| {
        let server = &server;
        async move {
            let response = server
                .post("/api/v1/auth/login")
                .json(&json!({
                    "username": username,
                    "password": TEST_PASSWORD,
                    "userAgent": "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0",
                }))
                .await;
            response.assert_status_ok();
            response.json::<Value>()["data"]["session"].clone()
        }
    };

    let moderator_session = login(moderator.username.clone()).await;
    let moderator_bearer = format!("Bearer {}", moderator_session["token"].as_str().unwrap());

    // Step 1: moderator creates a group with the member in it
    let group = server
        .post("/api/v1/groups")
        .add_header("authorization", &moderator_bearer)
        .json(&json!({
            "name": "Trail Runners",
            "description": "Weekend long runs",
            "type": "public",
            "memberIds": [member.id],
        }))
        .await;
    group.assert_status(StatusCode::CREATED);
    let group_id = group.json::<Value>()["data"]["id"].as_str().unwrap().to_string();

    // Step 2: moderator notifies the member
    let sent = server
        .post("/api/v1/notifications")
        .add_header("authorization", &moderator_bearer)
        .json(&json!({
            "recipientId": member.id,
            "title": "Welcome",
            "message": "You were added to Trail Runners",
        }))
        .await;
    sent.assert_status(StatusCode::CREATED);
    let notification_id = sent.json::<Value>()["data"]["id"].as_str().unwrap().to_string();

    // Step 3: the member logs in and sees both the group and the notification
    let member_session = login(member.username.clone()).await;
    let member_bearer = format!("Bearer {}", member_session["token"].as_str().unwrap());

    let detail = server
        .get(&format!("/api/v1/groups/{group_id}"))
        .add_header("authorization", &member_bearer)
        .await;
    detail.assert_status_ok();
    assert_eq!(detail.json::<Value>()["data"]["members"].as_array().unwrap().len(), 2);

    let inbox = server.get("/api/v1/notifications").add_header("authorization", &member_bearer).await;
    inbox.assert_status_ok();
    let inbox = inbox.json::<Value>();
    assert_eq!(inbox["unreadCount"], 1);
    assert_eq!(inbox["data"][0]["id"], notification_id.as_str());

    let read = server
        .put(&format!("/api/v1/notifications/{notification_id}/read"))
        .add_header("authorization", &member_bearer)
        .await;
    read.assert_status_ok();

    let inbox = server.get("/api/v1/notifications").add_header("authorization", &member_bearer).await;
    assert_eq!(inbox.json::<Value>()["unreadCount"], 0);

    // Step 4: logging out closes the session in the member's history
    server
        .post("/api/v1/auth/logout")
        .json(&json!({ "loginId": member_session["loginId"] }))
        .await
        .assert_status_ok();

    let history = server
        .get(&format!("/api/v1/users/{}/logins", member.id))
        .add_header("authorization", &member_bearer)
        .await;
    history.assert_status_ok();
    let entries = history.json::<Value>();
    let closed = entries["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["id"] == member_session["loginId"])
        .expect("login should appear in history");
    assert!(!closed["logoutTime"].is_null());
}

#[sqlx::test]
#[test_log::test]
async fn test_global_limit_keys_on_peer_address(pool: SqlitePool) {
    use axum::{body::Body, extract::ConnectInfo, http::Request};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    let mut config = create_test_config();
    config.limits.global.enabled = true;
    config.limits.global.max_requests = 1;
    let router = crate::build_router(create_test_state_with_config(pool, config)).unwrap();

    let request_from = |peer: &str| {
        let mut request = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(peer.parse::<SocketAddr>().unwrap()));
        request
    };

    let first = router.clone().oneshot(request_from("10.0.0.1:5000")).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = router.clone().oneshot(request_from("10.0.0.1:5001")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let other_peer = router.oneshot(request_from("10.0.0.2:5000")).await.unwrap();
    assert_eq!(other_peer.status(), StatusCode::OK);
}

#[test_log::test(tokio::test)]
async fn test_application_creates_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("zoe.db");

    let mut config = create_test_config();
    config.database.url = format!("sqlite://{}?mode=rwc", db_path.display());
    config.database.pool.min_connections = 0;

    let server = Application::new(config)
        .await
        .expect("Failed to create application")
        .into_test_server();

    server.get("/api/v1/health").await.assert_status_ok();
    assert!(db_path.exists());
}
