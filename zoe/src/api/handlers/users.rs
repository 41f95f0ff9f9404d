use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use tracing::info;

use crate::{
    AppState,
    api::{
        extract::{ApiJson, ApiPath, ApiQuery},
        models::{
            ApiResponse, MessageResponse,
            login_logs::LoginLogResponse,
            pagination::{PaginatedResponse, Pagination},
            users::{CurrentUser, DevicesResponse, ListUsersQuery, PasswordChange, UserCreate, UserCreated, UserResponse, UserUpdate},
        },
    },
    auth::{
        password,
        permissions::{AdminOnly, RequiresRole},
    },
    db::{
        errors::DbError,
        handlers::{Devices, LoginLogs, Repository, Users, login_logs::LoginLogFilter, users::UserFilter},
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
    errors::{Error, ErrorCode, Result},
    types::{UserId, abbrev_uuid},
};

const USERNAME_LENGTH: std::ops::RangeInclusive<usize> = 3..=30;

fn user_not_found(id: UserId) -> Error {
    Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
        code: ErrorCode::UserNotFound,
    }
}

fn access_denied() -> Error {
    Error::Forbidden {
        message: "Access denied".to_string(),
        code: ErrorCode::AccessDenied,
    }
}

fn validation_error(message: impl Into<String>) -> Error {
    Error::BadRequest {
        message: message.into(),
        code: ErrorCode::ValidationError,
    }
}

/// Loose shape check equivalent to `\S+@\S+\.\S+`
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some(at) = email.find('@') else {
        return false;
    };
    let domain = &email[at + 1..];
    at > 0
        && domain
            .char_indices()
            .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

fn normalize_username(username: &str) -> Result<String> {
    let username = username.trim();
    if !USERNAME_LENGTH.contains(&username.chars().count()) {
        return Err(validation_error("Username must be between 3 and 30 characters"));
    }
    Ok(username.to_string())
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(validation_error("Please provide a valid email address"));
    }
    Ok(email)
}

fn validate_max_devices(max_devices: i64) -> Result<i64> {
    if max_devices < 1 {
        return Err(validation_error("maxDevices must be at least 1"));
    }
    Ok(max_devices)
}

/// Load a user the caller is allowed to see, checking access before existence
async fn accessible_user(state: &AppState, current_user: &CurrentUser, user_id: UserId) -> Result<UserDBResponse> {
    if !current_user.can_access_user(user_id) {
        return Err(access_denied());
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    Users::new(&mut conn)
        .get_by_id(user_id)
        .await?
        .ok_or_else(|| user_not_found(user_id))
}

/// List active users
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Paginated list of active users", body = PaginatedResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    _: RequiresRole<AdminOnly>,
    ApiQuery(query): ApiQuery<ListUsersQuery>,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut filter = UserFilter::new(skip, limit);
    if let Some(role) = query.role {
        filter = filter.with_role(role);
    }
    if let Some(search) = query.search.filter(|s| !s.trim().is_empty()) {
        filter = filter.with_search(search.trim().to_string());
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Users::new(&mut conn);
    let users = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(UserResponse::from).collect(),
        total,
        &query.pagination,
    )))
}

/// Create a user with a generated temporary password
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = ApiResponse<UserCreated>),
        (status = 400, description = "Missing fields, invalid data, or username/email taken"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Internal server error"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    RequiresRole(admin, ..): RequiresRole<AdminOnly>,
    ApiJson(create): ApiJson<UserCreate>,
) -> Result<(StatusCode, Json<ApiResponse<UserCreated>>)> {
    let (Some(username), Some(email)) = (
        create.username.as_deref().filter(|s| !s.trim().is_empty()),
        create.email.as_deref().filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(Error::BadRequest {
            message: "Username and email are required".to_string(),
            code: ErrorCode::MissingRequiredFields,
        });
    };

    let request = UserCreateDBRequest {
        username: normalize_username(username)?,
        email: normalize_email(email)?,
        password_hash: String::new(),
        role: create.role.unwrap_or_default(),
        max_devices: validate_max_devices(create.max_devices.unwrap_or(state.config.auth.default_max_devices))?,
    };

    let temporary_password = password::generate_temporary_password();
    let password_hash = password::hash_password(temporary_password.clone(), state.config.auth.password.argon2_params())
        .await
        .map_err(|e| e.with_server_code(ErrorCode::CreateUserError))?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = Users::new(&mut conn)
        .create(&UserCreateDBRequest { password_hash, ..request })
        .await
        .map_err(|e| Error::from(e).with_server_code(ErrorCode::CreateUserError))?;

    info!(
        user_id = %abbrev_uuid(&user.id),
        created_by = %abbrev_uuid(&admin.id),
        role = %user.role,
        "User created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "User created successfully",
            UserCreated {
                user: user.into(),
                temporary_password,
            },
        )),
    ))
}

/// Get a user by ID (admin or self)
#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "User details including device count", body = ApiResponse<UserResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    let user = accessible_user(&state, &current_user, user_id).await?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let device_count = Devices::new(&mut conn).count_for_user(user.id).await?;

    Ok(Json(ApiResponse::new(UserResponse::from(user).with_device_count(device_count))))
}

/// Update a user (admin or self)
///
/// Role, device limit and activation can only be changed by admins; for anyone else those
/// fields are ignored.
#[utoipa::path(
    put,
    path = "/users/{user_id}",
    tag = "users",
    request_body = UserUpdate,
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "User updated", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid data or username/email taken"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(user_id): ApiPath<UserId>,
    ApiJson(update): ApiJson<UserUpdate>,
) -> Result<Json<ApiResponse<UserResponse>>> {
    if !current_user.can_access_user(user_id) {
        return Err(Error::Forbidden {
            message: "You can only update your own account".to_string(),
            code: ErrorCode::UpdateDenied,
        });
    }

    let mut request = UserUpdateDBRequest {
        username: update.username.as_deref().map(normalize_username).transpose()?,
        email: update.email.as_deref().map(normalize_email).transpose()?,
        ..Default::default()
    };
    if current_user.is_admin() {
        request.role = update.role;
        request.max_devices = update.max_devices.map(validate_max_devices).transpose()?;
        request.is_active = update.is_active;
    }

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    let mut repo = Users::new(&mut tx);
    if repo.get_by_id(user_id).await?.is_none() {
        return Err(user_not_found(user_id));
    }
    let user = repo.update(user_id, &request).await?;
    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(ApiResponse::with_message("User updated successfully", user.into())))
}

/// Change a password
///
/// Users changing their own password must supply the current one. Admins may reset anyone
/// else's password without it.
#[utoipa::path(
    put,
    path = "/users/{user_id}/password",
    tag = "users",
    request_body = PasswordChange,
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Missing fields, too short, or wrong current password"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(user_id): ApiPath<UserId>,
    ApiJson(change): ApiJson<PasswordChange>,
) -> Result<Json<MessageResponse>> {
    let user = accessible_user(&state, &current_user, user_id).await?;

    let Some(new_password) = change.new_password.filter(|p| !p.is_empty()) else {
        return Err(Error::BadRequest {
            message: "New password is required".to_string(),
            code: ErrorCode::MissingRequiredFields,
        });
    };
    password::validate_password(&new_password, &state.config.auth.password)?;

    if current_user.id == user_id {
        let current_password = change.current_password.unwrap_or_default();
        if current_password.is_empty() || !password::verify_password(current_password, user.password_hash.clone()).await? {
            return Err(Error::BadRequest {
                message: "Current password is incorrect".to_string(),
                code: ErrorCode::InvalidPassword,
            });
        }
    }

    let password_hash = password::hash_password(new_password, state.config.auth.password.argon2_params()).await?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    Users::new(&mut conn)
        .update(
            user.id,
            &UserUpdateDBRequest {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;

    info!(user_id = %abbrev_uuid(&user.id), changed_by = %abbrev_uuid(&current_user.id), "Password changed");
    Ok(Json(MessageResponse::new("Password updated successfully")))
}

/// Deactivate a user (soft delete)
#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "users",
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "User deactivated", body = MessageResponse),
        (status = 400, description = "Cannot delete your own account"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "User not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    RequiresRole(admin, ..): RequiresRole<AdminOnly>,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<MessageResponse>> {
    if admin.id == user_id {
        return Err(Error::BadRequest {
            message: "You cannot delete your own account".to_string(),
            code: ErrorCode::SelfDeleteNotAllowed,
        });
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    if !Users::new(&mut conn).deactivate(user_id).await? {
        return Err(user_not_found(user_id));
    }

    info!(user_id = %abbrev_uuid(&user_id), deleted_by = %abbrev_uuid(&admin.id), "User deactivated");
    Ok(Json(MessageResponse::new("User deactivated successfully")))
}

/// List a user's registered devices (admin or self)
#[utoipa::path(
    get,
    path = "/users/{user_id}/devices",
    tag = "users",
    params(("user_id" = String, Path, description = "User ID (UUID)")),
    responses(
        (status = 200, description = "Registered devices", body = ApiResponse<DevicesResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_devices(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(user_id): ApiPath<UserId>,
) -> Result<Json<ApiResponse<DevicesResponse>>> {
    let user = accessible_user(&state, &current_user, user_id).await?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let devices = Devices::new(&mut conn).list_for_user(user.id).await?;

    Ok(Json(ApiResponse::new(DevicesResponse::new(devices, user.max_devices))))
}

/// Forget a registered device, freeing a device slot (admin or self)
#[utoipa::path(
    delete,
    path = "/users/{user_id}/devices/{device_id}",
    tag = "users",
    params(
        ("user_id" = String, Path, description = "User ID (UUID)"),
        ("device_id" = String, Path, description = "Device fingerprint"),
    ),
    responses(
        (status = 200, description = "Device removed", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "Device not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_device(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath((user_id, device_id)): ApiPath<(UserId, String)>,
) -> Result<Json<MessageResponse>> {
    if !current_user.can_access_user(user_id) {
        return Err(access_denied());
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    if !Devices::new(&mut conn).remove(user_id, &device_id).await? {
        return Err(Error::NotFound {
            resource: "Device".to_string(),
            id: device_id,
            code: ErrorCode::DeviceNotFound,
        });
    }

    Ok(Json(MessageResponse::new("Device removed successfully")))
}

/// A user's login history, newest first (admin or self)
#[utoipa::path(
    get,
    path = "/users/{user_id}/logins",
    tag = "users",
    params(("user_id" = String, Path, description = "User ID (UUID)"), Pagination),
    responses(
        (status = 200, description = "Paginated login history", body = PaginatedResponse<LoginLogResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_logins(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(user_id): ApiPath<UserId>,
    ApiQuery(pagination): ApiQuery<Pagination>,
) -> Result<Json<PaginatedResponse<LoginLogResponse>>> {
    let user = accessible_user(&state, &current_user, user_id).await?;

    let (skip, limit) = pagination.params();
    let filter = LoginLogFilter::new(skip, limit).for_user(user.id);

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = LoginLogs::new(&mut conn);
    let logs = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        logs.into_iter().map(LoginLogResponse::from).collect(),
        total,
        &pagination,
    )))
}
