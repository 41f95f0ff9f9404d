//! Response models for the API index and health check.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// Overall service state reported by the health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// The service is up but the database did not answer
    Degraded,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DatabaseHealth {
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub success: bool,
    pub status: HealthStatus,
    /// Seconds since the server started
    pub uptime: u64,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub database: DatabaseHealth,
}

/// The API index served at `/`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiInfoResponse {
    pub success: bool,
    pub message: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    /// Route prefix for each resource
    pub endpoints: BTreeMap<String, String>,
}
