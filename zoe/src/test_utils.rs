//! Shared helpers for handler and integration tests.

use std::time::{Duration, Instant};

use axum_test::TestServer;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::auth::password::{Argon2Params, hash_string_with_params};
use crate::config::{Config, LimitsConfig, NotificationsConfig, RateLimitConfig};
use crate::db::handlers::{Repository, Users};
use crate::db::models::users::{UserCreateDBRequest, UserDBResponse};
use crate::limits::Limiters;
use crate::types::Role;
use crate::{AppState, build_router};

/// Password given to every user made by [`create_test_user`]
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Header carrying the API key in test requests
pub const API_KEY_HEADER: &str = "x-api-key";

/// Cheap argon2 parameters so tests do not spend their time hashing
fn fast_argon2() -> Argon2Params {
    Argon2Params {
        memory_kib: 128,
        iterations: 1,
        parallelism: 1,
    }
}

fn disabled_limit() -> RateLimitConfig {
    RateLimitConfig {
        enabled: false,
        window: Duration::from_secs(60),
        max_requests: 1,
    }
}

pub fn create_test_config() -> Config {
    let mut config = Config {
        environment: "test".to_string(),
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        limits: LimitsConfig {
            global: disabled_limit(),
            auth: disabled_limit(),
            admin: disabled_limit(),
        },
        notifications: NotificationsConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    };
    let argon2 = fast_argon2();
    config.auth.password.argon2_memory_kib = argon2.memory_kib;
    config.auth.password.argon2_iterations = argon2.iterations;
    config.auth.password.argon2_parallelism = argon2.parallelism;
    config.auth.api_key.record_requests = true;
    config.auth.default_max_devices = 3;
    config
}

pub fn create_test_state_with_config(pool: SqlitePool, config: Config) -> AppState {
    AppState::builder()
        .db(pool)
        .limiters(Limiters::new(&config.limits))
        .config(config)
        .started_at(Instant::now())
        .build()
}

pub fn create_test_state(pool: SqlitePool) -> AppState {
    create_test_state_with_config(pool, create_test_config())
}

pub async fn create_test_app_with_config(pool: SqlitePool, config: Config) -> TestServer {
    let router = build_router(create_test_state_with_config(pool, config)).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

pub async fn create_test_app(pool: SqlitePool) -> TestServer {
    create_test_app_with_config(pool, create_test_config()).await
}

/// Insert an active user with a unique username and [`TEST_PASSWORD`]
pub async fn create_test_user(pool: &SqlitePool, role: Role) -> UserDBResponse {
    let suffix = Uuid::new_v4().simple().to_string();
    let username = format!("testuser_{}", &suffix[..12]);
    let password_hash = hash_string_with_params(TEST_PASSWORD, Some(fast_argon2())).expect("Failed to hash test password");

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Users::new(&mut conn)
        .create(&UserCreateDBRequest {
            email: format!("{username}@example.com"),
            username,
            password_hash,
            role,
            max_devices: 3,
        })
        .await
        .expect("Failed to create test user")
}
