//! Database repository for notifications.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::notifications::{
        Channels, NotificationCreateDBRequest, NotificationDBResponse, NotificationStatus, NotificationType,
        NotificationUpdateDBRequest, Priority,
    },
};
use crate::types::{NotificationId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, types::Json};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing notifications
#[derive(Debug, Clone)]
pub struct NotificationFilter {
    pub skip: i64,
    pub limit: i64,
    pub recipient_id: Option<UserId>,
    pub status: Option<NotificationStatus>,
    /// Hide notifications whose `expires_at` is at or before this instant
    pub unexpired_at: Option<DateTime<Utc>>,
}

impl NotificationFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            recipient_id: None,
            status: None,
            unexpired_at: None,
        }
    }

    /// What a recipient sees in their inbox: their own live, non-deleted notifications
    pub fn inbox(recipient_id: UserId, skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            recipient_id: Some(recipient_id),
            status: None,
            unexpired_at: Some(Utc::now()),
        }
    }

    pub fn with_status(mut self, status: NotificationStatus) -> Self {
        self.status = Some(status);
        self
    }

    fn push_conditions<'a>(&'a self, query: &mut QueryBuilder<'a, Sqlite>) {
        if let Some(recipient_id) = self.recipient_id {
            query.push(" AND recipient_id = ");
            query.push_bind(recipient_id);
        }
        // Deleted notifications are never listed, whatever status was asked for
        query.push(" AND status != 'deleted'");
        if let Some(status) = self.status {
            query.push(" AND status = ");
            query.push_bind(status);
        }
        if let Some(now) = self.unexpired_at {
            query.push(" AND (expires_at IS NULL OR expires_at > ");
            query.push_bind(now);
            query.push(")");
        }
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Notification {
    pub id: NotificationId,
    pub recipient_id: UserId,
    pub sender_id: Option<UserId>,
    pub title: String,
    pub message: String,
    pub kind: NotificationType,
    pub priority: Priority,
    pub status: NotificationStatus,
    pub channel_in_app: bool,
    pub channel_email: bool,
    pub channel_sms: bool,
    pub channel_push: bool,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub metadata: Option<Json<serde_json::Value>>,
    pub action_url: Option<String>,
    pub action_label: Option<String>,
}

impl From<Notification> for NotificationDBResponse {
    fn from(n: Notification) -> Self {
        Self {
            id: n.id,
            recipient_id: n.recipient_id,
            sender_id: n.sender_id,
            title: n.title,
            message: n.message,
            kind: n.kind,
            priority: n.priority,
            status: n.status,
            channels: Channels {
                in_app: n.channel_in_app,
                email: n.channel_email,
                sms: n.channel_sms,
                push: n.channel_push,
            },
            sent_at: n.sent_at,
            read_at: n.read_at,
            expires_at: n.expires_at,
            metadata: n.metadata.map(|Json(value)| value),
            action_url: n.action_url,
            action_label: n.action_label,
        }
    }
}

pub struct Notifications<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Notifications<'c> {
    type CreateRequest = NotificationCreateDBRequest;
    type UpdateRequest = NotificationUpdateDBRequest;
    type Response = NotificationDBResponse;
    type Id = NotificationId;
    type Filter = NotificationFilter;

    #[instrument(skip(self, request), fields(recipient_id = %abbrev_uuid(&request.recipient_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (id, recipient_id, sender_id, title, message, kind, priority, status,
                                       channel_in_app, channel_email, channel_sms, channel_push,
                                       sent_at, expires_at, metadata, action_url, action_label)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'unread', ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.recipient_id)
        .bind(request.sender_id)
        .bind(&request.title)
        .bind(&request.message)
        .bind(request.kind)
        .bind(request.priority)
        .bind(request.channels.in_app)
        .bind(request.channels.email)
        .bind(request.channels.sms)
        .bind(request.channels.push)
        .bind(Utc::now())
        .bind(request.expires_at)
        .bind(request.metadata.clone().map(Json))
        .bind(&request.action_url)
        .bind(&request.action_label)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(NotificationDBResponse::from(notification))
    }

    #[instrument(skip(self), fields(notification_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let notification = sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(notification.map(NotificationDBResponse::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<NotificationId>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM notifications WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        query.push(")");

        let notifications = query.build_query_as::<Notification>().fetch_all(&mut *self.db).await?;

        Ok(notifications
            .into_iter()
            .map(|n| (n.id, NotificationDBResponse::from(n)))
            .collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM notifications WHERE 1=1");
        filter.push_conditions(&mut query);

        query.push(" ORDER BY sent_at DESC, rowid DESC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let notifications = query.build_query_as::<Notification>().fetch_all(&mut *self.db).await?;

        Ok(notifications.into_iter().map(NotificationDBResponse::from).collect())
    }

    #[instrument(skip(self), fields(notification_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(notification_id = %abbrev_uuid(&id), status = ?request.status), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let notification = sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET status = ?, read_at = COALESCE(?, read_at) WHERE id = ? RETURNING *",
        )
        .bind(request.status)
        .bind(request.read_at)
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(NotificationDBResponse::from(notification))
    }
}

impl<'c> Notifications<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &NotificationFilter) -> Result<i64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM notifications WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self), fields(recipient_id = %abbrev_uuid(&recipient_id)), err)]
    pub async fn unread_count(&mut self, recipient_id: UserId) -> Result<i64> {
        self.count(&NotificationFilter::inbox(recipient_id, 0, 0).with_status(NotificationStatus::Unread))
            .await
    }

    /// Fetch a notification only if it belongs to `recipient_id` and has not been deleted
    #[instrument(skip(self), fields(notification_id = %abbrev_uuid(&id)), err)]
    pub async fn get_for_recipient(
        &mut self,
        id: NotificationId,
        recipient_id: UserId,
    ) -> Result<Option<NotificationDBResponse>> {
        let notification = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE id = ? AND recipient_id = ? AND status != 'deleted'",
        )
        .bind(id)
        .bind(recipient_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(notification.map(NotificationDBResponse::from))
    }

    /// Remove every notification whose expiry has passed, returning how many were removed
    #[instrument(skip(self), err)]
    pub async fn delete_expired(&mut self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
