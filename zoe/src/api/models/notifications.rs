use super::pagination::{Pagination, PaginationInfo};
use crate::db::models::notifications::{
    Channels, NotificationDBResponse, NotificationStatus, NotificationType, Priority,
};
use crate::types::{NotificationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Maximum length of a notification title, in characters.
pub const MAX_TITLE_LENGTH: usize = 100;

/// Maximum length of a notification message, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 500;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListNotificationsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only notifications in this state
    pub status: Option<NotificationStatus>,
}

/// Request body for sending a notification
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCreate {
    #[schema(value_type = String, format = "uuid")]
    pub recipient_id: UserId,
    #[schema(max_length = 100)]
    pub title: String,
    #[schema(max_length = 500)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub channels: Channels,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: NotificationId,
    #[schema(value_type = String, format = "uuid")]
    pub recipient_id: UserId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub sender_id: Option<UserId>,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub priority: Priority,
    pub status: NotificationStatus,
    pub channels: Channels,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
}

impl From<NotificationDBResponse> for NotificationResponse {
    fn from(db: NotificationDBResponse) -> Self {
        Self {
            id: db.id,
            recipient_id: db.recipient_id,
            sender_id: db.sender_id,
            title: db.title,
            message: db.message,
            kind: db.kind,
            priority: db.priority,
            status: db.status,
            channels: db.channels,
            sent_at: db.sent_at,
            read_at: db.read_at,
            expires_at: db.expires_at,
            metadata: db.metadata,
            action_url: db.action_url,
            action_label: db.action_label,
        }
    }
}

/// A page of the caller's inbox plus their unread total
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub success: bool,
    pub data: Vec<NotificationResponse>,
    pub pagination: PaginationInfo,
    pub unread_count: i64,
}
