use crate::types::{DeviceRecordId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database request for registering a device against a user
#[derive(Debug, Clone)]
pub struct DeviceCreateDBRequest {
    pub user_id: UserId,
    pub device_id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub is_trusted: bool,
}

/// Database response for a registered device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct DeviceDBResponse {
    pub id: DeviceRecordId,
    pub user_id: UserId,
    pub device_id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub is_trusted: bool,
    pub last_used: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}
