use crate::types::{LoginLogId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Outcome of a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LoginStatus {
    Success,
    Failed,
    Blocked,
    Expired,
}

/// Why a login attempt did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum FailureReason {
    WrongPassword,
    UserNotFound,
    InactiveAccount,
    DeviceNotTrusted,
    RateLimit,
    InvalidApiKey,
}

/// Database request for recording a login attempt
#[derive(Debug, Clone)]
pub struct LoginLogCreateDBRequest {
    pub user_id: Option<UserId>,
    pub device_id: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub status: LoginStatus,
    pub failure_reason: Option<FailureReason>,
    pub is_suspicious: bool,
}

impl LoginLogCreateDBRequest {
    /// A successful login from a known user
    pub fn success(user_id: UserId, ip_address: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            device_id: None,
            ip_address: ip_address.into(),
            user_agent: None,
            browser: None,
            os: None,
            status: LoginStatus::Success,
            failure_reason: None,
            is_suspicious: false,
        }
    }

    /// A rejected attempt. Failed attempts are flagged as suspicious.
    pub fn rejected(
        user_id: Option<UserId>,
        ip_address: impl Into<String>,
        status: LoginStatus,
        failure_reason: FailureReason,
    ) -> Self {
        Self {
            user_id,
            device_id: None,
            ip_address: ip_address.into(),
            user_agent: None,
            browser: None,
            os: None,
            status,
            failure_reason: Some(failure_reason),
            is_suspicious: status == LoginStatus::Failed,
        }
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        if let Some(ua) = user_agent.as_deref() {
            self.browser = Some(crate::auth::device::parse_browser(ua).to_string());
            self.os = Some(crate::auth::device::parse_os(ua).to_string());
        }
        self.user_agent = user_agent;
        self
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// Database request for closing a session
#[derive(Debug, Clone)]
pub struct LoginLogUpdateDBRequest {
    pub logout_time: DateTime<Utc>,
    pub session_duration: i64,
}

/// Database response for a login log entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct LoginLogDBResponse {
    pub id: LoginLogId,
    pub user_id: Option<UserId>,
    pub login_time: DateTime<Utc>,
    pub logout_time: Option<DateTime<Utc>>,
    pub session_duration: Option<i64>,
    pub device_id: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub status: LoginStatus,
    pub failure_reason: Option<FailureReason>,
    pub is_suspicious: bool,
}
