//! Login, session and logout payloads.

use super::login_logs::LoginLogResponse;
use crate::types::{LoginLogId, Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Body for `POST /auth/login`
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Overrides the `User-Agent` header for fingerprinting
    pub user_agent: Option<String>,
    /// Overrides the client address for fingerprinting
    pub ip_address: Option<String>,
}

/// The user block of a login response
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub last_login: Option<DateTime<Utc>>,
    pub login_count: i64,
}

/// The session block of a login response
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Pass this to `/auth/logout` to close the session
    #[schema(value_type = String, format = "uuid")]
    pub login_id: LoginLogId,
    /// Whether the device was already registered before this login
    pub device_registered: bool,
    pub device_id: String,
    /// True when this login registered the device
    pub new_device: bool,
    /// Bearer token for subsequent requests
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: LoginUser,
    pub session: SessionInfo,
}

/// Query parameters for `GET /auth/session`
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct SessionQuery {
    /// The user to describe
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub last_login: Option<DateTime<Utc>>,
    /// Number of devices on the account; `/users/{id}/devices` lists them
    pub registered_devices: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: SessionUser,
    /// The five most recent login attempts
    pub recent_logins: Vec<LoginLogResponse>,
    pub device_limit: i64,
}

/// Body for `POST /auth/logout`
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    /// The `loginId` returned by login. Unknown or malformed ids are ignored.
    pub login_id: Option<String>,
}
