//! # zoe: backend for a small social network
//!
//! `zoe` serves a JSON API for user accounts, groups, login auditing and notifications. It is
//! built on [Axum](https://github.com/tokio-rs/axum) and stores everything in SQLite through
//! `sqlx`.
//!
//! ## Request Flow
//!
//! Every route lives under `/api/v1` except the index at `/`. A request passes through the
//! tracing, CORS and global rate-limit layers, then reaches its handler. Handlers authenticate by
//! taking [`api::models::users::CurrentUser`] (session token or API key) or
//! [`auth::permissions::RequiresRole`] as an extractor, then talk to the database through the
//! repositories in [`db::handlers`]. Login gets its own limiter that only counts failed attempts,
//! and the admin-only user routes get a third limiter.
//!
//! Logins are tied to devices: each successful login registers (or refreshes) a fingerprint of the
//! client's user agent and address, and users can only hold `max_devices` of them. Every login
//! attempt, including API-key use, is written to the login log.
//!
//! ## Background Services
//!
//! The only background task is the notification expiry sweeper ([`notifications`]). It shares a
//! cancellation token with the server and stops during graceful shutdown.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use zoe::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = zoe::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     zoe::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and `ZOE_` environment overrides.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod limits;
pub mod notifications;
mod openapi;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod test;

use std::time::{Duration, Instant};

use anyhow::Context;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
};
use bon::Builder;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    api::handlers::{auth as auth_handlers, groups, notifications as notification_handlers, system, users},
    auth::password,
    config::CorsOrigin,
    db::{
        handlers::{Repository, Users},
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
    limits::Limiters,
    openapi::ApiDoc,
    types::{Role, abbrev_uuid},
};

pub use config::Config;
pub use types::{GroupId, NotificationId, UserId};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .limiters(Limiters::new(&config.limits))
///     .config(config)
///     .started_at(Instant::now())
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    #[builder(default)]
    pub limiters: Limiters,
    /// When the server started, for the health check's uptime
    pub started_at: Instant,
}

/// Get the zoe database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the configured admin account if it doesn't exist.
///
/// Idempotent: an existing account with the configured username is returned untouched, unless
/// `reset` is set, in which case its password is re-hashed, its role set to admin and the account
/// reactivated.
#[instrument(skip_all, fields(username = %config.admin.username))]
pub async fn create_initial_admin_user(
    config: &Config,
    password: &str,
    db: &SqlitePool,
    reset: bool,
) -> anyhow::Result<UserDBResponse> {
    let password_hash = password::hash_password(password.to_string(), config.auth.password.argon2_params())
        .await
        .context("Failed to hash admin password")?;

    let mut tx = db.begin().await?;
    let mut user_repo = Users::new(&mut tx);

    if let Some(existing) = user_repo.get_user_by_username(&config.admin.username).await? {
        if !reset {
            tx.commit().await?;
            info!(user_id = %abbrev_uuid(&existing.id), "Admin user already exists");
            return Ok(existing);
        }

        let updated = user_repo
            .update(
                existing.id,
                &UserUpdateDBRequest {
                    role: Some(Role::Admin),
                    is_active: Some(true),
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;
        tx.commit().await?;
        info!(user_id = %abbrev_uuid(&updated.id), "Admin user reset");
        return Ok(updated);
    }

    let created = user_repo
        .create(&UserCreateDBRequest {
            username: config.admin.username.clone(),
            email: config.admin.email.to_lowercase(),
            password_hash,
            role: Role::Admin,
            max_devices: config.auth.default_max_devices,
        })
        .await?;
    tx.commit().await?;

    info!(user_id = %abbrev_uuid(&created.id), "Admin user created");
    Ok(created)
}

/// Connect to SQLite and bring the schema up to date
async fn setup_database(config: &Config) -> anyhow::Result<SqlitePool> {
    let settings = &config.database.pool;
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(settings.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(settings.max_lifetime_secs))
        .connect(&config.database.url)
        .await
        .with_context(|| format!("Failed to connect to database at {}", config.database.url))?;

    migrator().run(&pool).await.context("Failed to run migrations")?;
    Ok(pool)
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                // Origins never carry the trailing slash that Url adds
                origins.push(url.as_str().trim_end_matches('/').parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::try_from(config.auth.api_key.header_name.as_str())?,
        ])
        .allow_credentials(cors_config.allow_credentials)
        .expose_headers([header::RETRY_AFTER]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// - `/` API index
/// - `/api/v1/*` resources, the health check, the OpenAPI document and its Scalar UI
/// - CORS, tracing and the global rate limit on everything
/// - a JSON 404 for unmatched routes
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let auth_limit = from_fn_with_state(state.clone(), limits::auth_rate_limit);
    let admin_limit = from_fn_with_state(state.clone(), limits::admin_rate_limit);

    let auth_routes = Router::new()
        .route("/auth/login", post(auth_handlers::login).route_layer(auth_limit))
        .route("/auth/session", get(auth_handlers::session))
        .route("/auth/logout", post(auth_handlers::logout));

    let user_routes = Router::new()
        .route(
            "/users",
            get(users::list_users).post(users::create_user).route_layer(admin_limit.clone()),
        )
        .route(
            "/users/{user_id}",
            get(users::get_user)
                .put(users::update_user)
                .merge(delete(users::delete_user).route_layer(admin_limit)),
        )
        .route("/users/{user_id}/password", put(users::change_password))
        .route("/users/{user_id}/devices", get(users::list_devices))
        .route("/users/{user_id}/devices/{device_id}", delete(users::remove_device))
        .route("/users/{user_id}/logins", get(users::list_logins));

    let group_routes = Router::new()
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route(
            "/groups/{group_id}",
            get(groups::get_group).put(groups::update_group).delete(groups::delete_group),
        )
        .route("/groups/{group_id}/members", post(groups::add_member))
        .route("/groups/{group_id}/members/{user_id}", delete(groups::remove_member));

    let notification_routes = Router::new()
        .route(
            "/notifications",
            get(notification_handlers::list_notifications).post(notification_handlers::send_notification),
        )
        .route("/notifications/{notification_id}", delete(notification_handlers::delete_notification))
        .route("/notifications/{notification_id}/read", put(notification_handlers::mark_read));

    let api_routes = Router::new()
        .route("/health", get(system::health))
        .route("/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .merge(auth_routes)
        .merge(user_routes)
        .merge(group_routes)
        .merge(notification_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let router = Router::new()
        .route("/", get(system::api_info))
        .nest("/api/v1", api_routes)
        .fallback(system::not_found)
        .layer(from_fn_with_state(state.clone(), limits::global_rate_limit))
        .with_state(state.clone());

    let router = router.layer(create_cors_layer(&state.config)?).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The server plus its background sweeper.
///
/// 1. **Create**: [`Application::new`] connects, migrates, seeds the admin and starts the sweeper
/// 2. **Serve**: [`Application::serve`] binds and handles requests until the shutdown future resolves
/// 3. **Shutdown**: the sweeper is cancelled and the pool closed
pub struct Application {
    router: Router,
    config: Config,
    pool: SqlitePool,
    shutdown_token: CancellationToken,
    sweeper: Option<JoinHandle<()>>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Create an application on an existing pool (migrations are still applied)
    pub async fn new_with_pool(config: Config, pool: Option<SqlitePool>) -> anyhow::Result<Self> {
        debug!("Starting zoe with configuration: {:#?}", config);

        let pool = match pool {
            Some(pool) => {
                migrator().run(&pool).await.context("Failed to run migrations")?;
                pool
            }
            None => setup_database(&config).await?,
        };

        if let Some(admin_password) = config.admin.password.as_deref() {
            create_initial_admin_user(&config, admin_password, &pool, false).await?;
        }

        let shutdown_token = CancellationToken::new();
        let sweeper = config.notifications.enabled.then(|| {
            tokio::spawn(notifications::run_expiry_sweeper(
                config.notifications.clone(),
                pool.clone(),
                shutdown_token.clone(),
            ))
        });

        let app_state = AppState::builder()
            .db(pool.clone())
            .limiters(Limiters::new(&config.limits))
            .config(config.clone())
            .started_at(Instant::now())
            .build();
        let router = build_router(app_state)?;

        Ok(Self {
            router,
            config,
            pool,
            shutdown_token,
            sweeper,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind {bind_addr}"))?;
        info!(
            "Zoe listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("Stopping background tasks...");
        self.shutdown_token.cancel();
        if let Some(sweeper) = self.sweeper
            && let Err(e) = sweeper.await
        {
            tracing::warn!(error = %e, "Notification sweeper did not stop cleanly");
        }

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}

