use super::pagination::Pagination;
use crate::db::models::{devices::DeviceDBResponse, users::UserDBResponse};
use crate::types::{Role, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// The authenticated caller of a request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins may act on any user; everyone else only on themselves
    pub fn can_access_user(&self, user_id: UserId) -> bool {
        self.is_admin() || self.id == user_id
    }
}

impl From<UserDBResponse> for CurrentUser {
    fn from(user: UserDBResponse) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        }
    }
}

/// A user account as returned by the API. The password hash is never exposed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub max_devices: i64,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub login_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Number of registered devices (only on single-user lookups)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_count: Option<i64>,
}

impl UserResponse {
    pub fn with_device_count(mut self, device_count: i64) -> Self {
        self.device_count = Some(device_count);
        self
    }
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            role: db.role,
            max_devices: db.max_devices,
            is_active: db.is_active,
            last_login: db.last_login,
            login_count: db.login_count,
            created_at: db.created_at,
            updated_at: db.updated_at,
            device_count: None,
        }
    }
}

/// Body for `POST /users`.
///
/// Required fields are optional here so a missing one produces `MISSING_REQUIRED_FIELDS`
/// rather than a generic decoding error.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCreate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    #[schema(minimum = 1)]
    pub max_devices: Option<i64>,
}

/// Returned once on account creation; the temporary password is not retrievable later
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserCreated {
    pub user: UserResponse,
    pub temporary_password: String,
}

/// Body for `PUT /users/{id}`. Role, device limit and activation are admin-only and are
/// ignored for everyone else.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    #[schema(minimum = 1)]
    pub max_devices: Option<i64>,
    pub is_active: Option<bool>,
}

/// Body for `PUT /users/{id}/password`
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    /// Required when changing your own password
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// Query parameters for listing users
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only users with this role
    pub role: Option<Role>,

    /// Case-insensitive substring match on username or email
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub device_id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub is_trusted: bool,
    pub last_used: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

impl From<DeviceDBResponse> for DeviceResponse {
    fn from(device: DeviceDBResponse) -> Self {
        Self {
            device_id: device.device_id,
            user_agent: device.user_agent,
            ip_address: device.ip_address,
            browser: device.browser,
            os: device.os,
            is_trusted: device.is_trusted,
            last_used: device.last_used,
            registered_at: device.registered_at,
        }
    }
}

/// A user's registered devices and how many more they may add
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevicesResponse {
    pub devices: Vec<DeviceResponse>,
    pub device_count: i64,
    pub max_devices: i64,
    pub can_add_more: bool,
}

impl DevicesResponse {
    pub fn new(devices: Vec<DeviceDBResponse>, max_devices: i64) -> Self {
        let device_count = devices.len() as i64;
        Self {
            devices: devices.into_iter().map(DeviceResponse::from).collect(),
            device_count,
            max_devices,
            can_add_more: device_count < max_devices,
        }
    }
}
