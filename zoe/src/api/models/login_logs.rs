use crate::db::models::login_logs::{FailureReason, LoginLogDBResponse, LoginStatus};
use crate::types::{LoginLogId, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// One entry of the login audit trail
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginLogResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: LoginLogId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    pub login_time: DateTime<Utc>,
    pub logout_time: Option<DateTime<Utc>>,
    /// Session length in seconds, set on logout
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

impl From<LoginLogDBResponse> for LoginLogResponse {
    fn from(log: LoginLogDBResponse) -> Self {
        Self {
            id: log.id,
            user_id: log.user_id,
            login_time: log.login_time,
            logout_time: log.logout_time,
            session_duration: log.session_duration,
            device_id: log.device_id,
            ip_address: log.ip_address,
            user_agent: log.user_agent,
            browser: log.browser,
            os: log.os,
            status: log.status,
            failure_reason: log.failure_reason,
            is_suspicious: log.is_suspicious,
        }
    }
}
