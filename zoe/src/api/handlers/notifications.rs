use axum::{Json, extract::State, http::StatusCode};
use chrono::Utc;
use tracing::info;

use crate::{
    AppState,
    api::{
        extract::{ApiJson, ApiPath, ApiQuery},
        models::{
            ApiResponse, MessageResponse,
            notifications::{
                ListNotificationsQuery, MAX_MESSAGE_LENGTH, MAX_TITLE_LENGTH, NotificationCreate,
                NotificationListResponse, NotificationResponse,
            },
            pagination::PaginationInfo,
            users::CurrentUser,
        },
    },
    auth::permissions::{AdminOrModerator, RequiresRole},
    db::{
        errors::DbError,
        handlers::{Notifications, Repository, Users, notifications::NotificationFilter},
        models::notifications::{
            NotificationCreateDBRequest, NotificationDBResponse, NotificationStatus, NotificationUpdateDBRequest,
        },
    },
    errors::{Error, ErrorCode, Result},
    types::{NotificationId, abbrev_uuid},
};

fn notification_not_found(id: NotificationId) -> Error {
    Error::NotFound {
        resource: "Notification".to_string(),
        id: id.to_string(),
        code: ErrorCode::NotificationNotFound,
    }
}

/// Trim a text field and check it is non-empty and within `max` characters
fn bounded_text(field: &str, value: &str, max: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > max {
        return Err(Error::BadRequest {
            message: format!("{field} must be between 1 and {max} characters"),
            code: ErrorCode::ValidationError,
        });
    }
    Ok(value.to_string())
}

/// List the caller's notifications
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "A page of the caller's notifications", body = NotificationListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_notifications(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiQuery(query): ApiQuery<ListNotificationsQuery>,
) -> Result<Json<NotificationListResponse>> {
    let (skip, limit) = query.pagination.params();
    let mut filter = NotificationFilter::inbox(current_user.id, skip, limit);
    if let Some(status) = query.status {
        filter = filter.with_status(status);
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Notifications::new(&mut conn);
    let notifications = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;
    let unread_count = repo.unread_count(current_user.id).await?;

    Ok(Json(NotificationListResponse {
        success: true,
        data: notifications.into_iter().map(NotificationResponse::from).collect(),
        pagination: PaginationInfo::new(&query.pagination, total),
        unread_count,
    }))
}

/// Send a notification to a user
#[utoipa::path(
    post,
    path = "/notifications",
    tag = "notifications",
    request_body = NotificationCreate,
    responses(
        (status = 201, description = "Notification sent", body = ApiResponse<NotificationResponse>),
        (status = 400, description = "Invalid notification"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin or moderator role required"),
        (status = 404, description = "Recipient not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn send_notification(
    State(state): State<AppState>,
    RequiresRole(sender, ..): RequiresRole<AdminOrModerator>,
    ApiJson(create): ApiJson<NotificationCreate>,
) -> Result<(StatusCode, Json<ApiResponse<NotificationResponse>>)> {
    let request = NotificationCreateDBRequest {
        recipient_id: create.recipient_id,
        sender_id: Some(sender.id),
        title: bounded_text("title", &create.title, MAX_TITLE_LENGTH)?,
        message: bounded_text("message", &create.message, MAX_MESSAGE_LENGTH)?,
        kind: create.kind,
        priority: create.priority,
        channels: create.channels,
        expires_at: create.expires_at,
        metadata: create.metadata,
        action_url: create.action_url,
        action_label: create.action_label,
    };

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    if Users::new(&mut tx).get_active_by_id(request.recipient_id).await?.is_none() {
        return Err(Error::NotFound {
            resource: "User".to_string(),
            id: request.recipient_id.to_string(),
            code: ErrorCode::UserNotFound,
        });
    }
    let notification = Notifications::new(&mut tx).create(&request).await?;
    tx.commit().await.map_err(DbError::from)?;

    info!(
        notification_id = %abbrev_uuid(&notification.id),
        recipient_id = %abbrev_uuid(&notification.recipient_id),
        sender_id = %abbrev_uuid(&sender.id),
        "Notification sent"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Notification sent successfully", notification.into())),
    ))
}

/// Mark one of the caller's notifications as read
#[utoipa::path(
    put,
    path = "/notifications/{notification_id}/read",
    tag = "notifications",
    params(("notification_id" = String, Path, description = "Notification ID (UUID)")),
    responses(
        (status = 200, description = "Notification marked as read", body = ApiResponse<NotificationResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Notification not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn mark_read(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(notification_id): ApiPath<NotificationId>,
) -> Result<Json<ApiResponse<NotificationResponse>>> {
    let notification = set_status(&state, &current_user, notification_id, NotificationStatus::Read).await?;
    Ok(Json(ApiResponse::with_message(
        "Notification marked as read",
        notification.into(),
    )))
}

/// Delete one of the caller's notifications
///
/// The row is kept with status `deleted` and disappears from the inbox.
#[utoipa::path(
    delete,
    path = "/notifications/{notification_id}",
    tag = "notifications",
    params(("notification_id" = String, Path, description = "Notification ID (UUID)")),
    responses(
        (status = 200, description = "Notification deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Notification not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_notification(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(notification_id): ApiPath<NotificationId>,
) -> Result<Json<MessageResponse>> {
    set_status(&state, &current_user, notification_id, NotificationStatus::Deleted).await?;
    Ok(Json(MessageResponse::new("Notification deleted successfully")))
}

async fn set_status(
    state: &AppState,
    current_user: &CurrentUser,
    id: NotificationId,
    status: NotificationStatus,
) -> Result<NotificationDBResponse> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    let mut repo = Notifications::new(&mut tx);
    if repo.get_for_recipient(id, current_user.id).await?.is_none() {
        return Err(notification_not_found(id));
    }

    let read_at = (status == NotificationStatus::Read).then(Utc::now);
    let notification = repo.update(id, &NotificationUpdateDBRequest { status, read_at }).await?;
    tx.commit().await.map_err(DbError::from)?;
    Ok(notification)
}
