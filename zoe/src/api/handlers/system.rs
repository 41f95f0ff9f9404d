//! API index, health check and the fallback for unmatched routes.

use std::collections::BTreeMap;

use axum::{Json, extract::State, http::Uri};
use chrono::Utc;
use tracing::warn;

use crate::{
    AppState,
    api::models::system::{ApiInfoResponse, DatabaseHealth, HealthResponse, HealthStatus},
    errors::Error,
};

/// Describe the API and where each resource lives
#[utoipa::path(
    get,
    path = "/",
    tag = "system",
    responses((status = 200, description = "API information", body = ApiInfoResponse)),
)]
#[tracing::instrument(skip_all)]
pub async fn api_info() -> Json<ApiInfoResponse> {
    let endpoints = [
        ("health", "/api/v1/health"),
        ("auth", "/api/v1/auth"),
        ("users", "/api/v1/users"),
        ("groups", "/api/v1/groups"),
        ("notifications", "/api/v1/notifications"),
        ("docs", "/api/v1/docs"),
    ]
    .into_iter()
    .map(|(name, path)| (name.to_string(), path.to_string()))
    .collect::<BTreeMap<_, _>>();

    Json(ApiInfoResponse {
        success: true,
        message: "Zoe API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        endpoints,
    })
}

/// Report liveness and database connectivity
///
/// Always answers 200; a failed database ping shows up as `degraded`.
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses((status = 200, description = "Service health", body = HealthResponse)),
)]
#[tracing::instrument(skip_all)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "Database ping failed");
            false
        }
    };

    Json(HealthResponse {
        success: true,
        status: if connected { HealthStatus::Healthy } else { HealthStatus::Degraded },
        uptime: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
        environment: state.config.environment.clone(),
        database: DatabaseHealth { connected },
    })
}

/// JSON 404 for anything no route matched
pub async fn not_found(uri: Uri) -> Error {
    Error::EndpointNotFound {
        path: uri.path_and_query().map_or_else(|| uri.path().to_string(), |p| p.as_str().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_state};
    use axum::http::StatusCode;
    use serde_json::Value;
    use sqlx::SqlitePool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_api_info(pool: SqlitePool) {
        let server = create_test_app(pool).await;

        let response = server.get("/").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["endpoints"]["users"], "/api/v1/users");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_health_reports_database(pool: SqlitePool) {
        let server = create_test_app(pool).await;

        let response = server.get("/api/v1/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"]["connected"], true);
        assert_eq!(body["environment"], "test");
        assert!(body["uptime"].is_u64());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_health_degraded_when_pool_closed(pool: SqlitePool) {
        let state = create_test_state(pool.clone());
        pool.close().await;

        let Json(health) = health(State(state)).await;
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(!health.database.connected);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_unknown_route_is_json_404(pool: SqlitePool) {
        let server = create_test_app(pool).await;

        let response = server.get("/api/v1/nothing-here?x=1").await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "ENDPOINT_NOT_FOUND");
        assert_eq!(body["requestedUrl"], "/api/v1/nothing-here?x=1");
    }
}
