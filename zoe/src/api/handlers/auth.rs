use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    AppState,
    api::{
        extract::{ApiJson, ClientInfo, UNKNOWN_CLIENT},
        models::{
            ApiResponse, MessageResponse,
            auth::{LoginRequest, LoginResponse, LoginUser, LogoutRequest, SessionInfo, SessionQuery, SessionResponse, SessionUser},
            login_logs::LoginLogResponse,
            users::CurrentUser,
        },
    },
    auth::{device::DeviceInfo, password, session},
    db::{
        errors::DbError,
        handlers::{Devices, LoginLogs, Repository, Users},
        models::{
            devices::DeviceCreateDBRequest,
            login_logs::{FailureReason, LoginLogCreateDBRequest, LoginStatus},
        },
    },
    errors::{Error, ErrorCode, Result},
    types::{UserId, abbrev_uuid},
};

/// Number of recent login attempts included in a session summary
const RECENT_LOGINS: i64 = 5;

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid username or password".to_string()),
        code: ErrorCode::InvalidCredentials,
    }
}

/// Log in with username and password
///
/// The device the request comes from is fingerprinted and registered against the account. A login
/// from an unregistered device is refused once the account's device slots are full.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    tag = "auth",
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Username or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Device limit reached"),
        (status = 429, description = "Too many failed attempts"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>> {
    let username = request.username.as_deref().map(str::trim).unwrap_or_default();
    let password = request.password.clone().unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Err(Error::BadRequest {
            message: "Username and password are required".to_string(),
            code: ErrorCode::MissingCredentials,
        });
    }

    // Fingerprint overrides in the body win over what the transport tells us
    let device = DeviceInfo::new(
        request
            .user_agent
            .clone()
            .or(client.user_agent)
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string()),
        request.ip_address.clone().unwrap_or(client.ip_address),
    );

    let response = authenticate(&state, username, password, &device)
        .await
        .map_err(|e| e.with_server_code(ErrorCode::LoginServerError))?;

    Ok(Json(ApiResponse::with_message("Login successful", response)))
}

async fn authenticate(state: &AppState, username: &str, password: String, device: &DeviceInfo) -> Result<LoginResponse> {
    let user = {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Users::new(&mut conn).get_user_by_username(username).await?
    };

    let Some(user) = user.filter(|u| u.is_active) else {
        warn!(ip = %device.ip_address, "Login attempt for unknown or inactive user");
        record_rejection(state, None, device, LoginStatus::Failed, FailureReason::UserNotFound).await?;
        return Err(invalid_credentials());
    };

    if !password::verify_password(password, user.password_hash.clone()).await? {
        warn!(user_id = %abbrev_uuid(&user.id), ip = %device.ip_address, "Login attempt with wrong password");
        record_rejection(state, Some(user.id), device, LoginStatus::Failed, FailureReason::WrongPassword).await?;
        return Err(invalid_credentials());
    }

    let device_id = device.device_id();
    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let new_device = if Devices::new(&mut tx).find(user.id, &device_id).await?.is_some() {
        Devices::new(&mut tx).touch(user.id, &device_id).await?;
        false
    } else {
        let registered = Devices::new(&mut tx).count_for_user(user.id).await?;
        if registered >= user.max_devices {
            warn!(
                user_id = %abbrev_uuid(&user.id),
                registered,
                max_devices = user.max_devices,
                "Login blocked by device limit"
            );
            LoginLogs::new(&mut tx)
                .create(
                    &LoginLogCreateDBRequest::rejected(
                        Some(user.id),
                        device.ip_address.clone(),
                        LoginStatus::Blocked,
                        FailureReason::DeviceNotTrusted,
                    )
                    .with_user_agent(Some(device.user_agent.clone()))
                    .with_device_id(device_id),
                )
                .await?;
            tx.commit().await.map_err(DbError::from)?;
            return Err(Error::DeviceLimitExceeded {
                max_devices: user.max_devices,
            });
        }

        Devices::new(&mut tx)
            .register(&DeviceCreateDBRequest {
                user_id: user.id,
                device_id: device_id.clone(),
                user_agent: Some(device.user_agent.clone()),
                ip_address: Some(device.ip_address.clone()),
                browser: Some(device.browser().to_string()),
                os: Some(device.os().to_string()),
                is_trusted: false,
            })
            .await?;
        true
    };

    let user = Users::new(&mut tx).record_login(user.id).await?;
    let log = LoginLogs::new(&mut tx)
        .create(
            &LoginLogCreateDBRequest::success(user.id, device.ip_address.clone())
                .with_user_agent(Some(device.user_agent.clone()))
                .with_device_id(device_id.clone()),
        )
        .await?;
    tx.commit().await.map_err(DbError::from)?;

    let login_user = LoginUser {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        role: user.role,
        last_login: user.last_login,
        login_count: user.login_count,
    };
    let (token, expires_at) = session::create_session_token(&CurrentUser::from(user), &state.config)?;

    info!(user_id = %abbrev_uuid(&login_user.id), new_device, "User logged in");

    Ok(LoginResponse {
        user: login_user,
        session: SessionInfo {
            login_id: log.id,
            device_registered: !new_device,
            device_id,
            new_device,
            token,
            expires_at,
        },
    })
}

async fn record_rejection(
    state: &AppState,
    user_id: Option<UserId>,
    device: &DeviceInfo,
    status: LoginStatus,
    reason: FailureReason,
) -> Result<()> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    LoginLogs::new(&mut conn)
        .create(
            &LoginLogCreateDBRequest::rejected(user_id, device.ip_address.clone(), status, reason)
                .with_user_agent(Some(device.user_agent.clone())),
        )
        .await?;
    Ok(())
}

/// Describe a user's session state: registered devices and recent login attempts
#[utoipa::path(
    get,
    path = "/auth/session",
    tag = "auth",
    params(SessionQuery),
    responses(
        (status = 200, description = "Session summary", body = ApiResponse<SessionResponse>),
        (status = 400, description = "userId missing"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<ApiResponse<SessionResponse>>> {
    let raw_id = query.user_id.as_deref().map(str::trim).unwrap_or_default();
    if raw_id.is_empty() {
        return Err(Error::BadRequest {
            message: "userId is required".to_string(),
            code: ErrorCode::UserIdRequired,
        });
    }

    let user_not_found = || Error::NotFound {
        resource: "User".to_string(),
        id: raw_id.to_string(),
        code: ErrorCode::UserNotFound,
    };
    let user_id = Uuid::parse_str(raw_id).map_err(|_| user_not_found())?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let user = Users::new(&mut conn).get_by_id(user_id).await?.ok_or_else(user_not_found)?;
    let registered_devices = Devices::new(&mut conn).count_for_user(user.id).await?;
    let recent_logins = LoginLogs::new(&mut conn).recent_for_user(user.id, RECENT_LOGINS).await?;

    Ok(Json(ApiResponse::new(SessionResponse {
        user: SessionUser {
            id: user.id,
            username: user.username,
            role: user.role,
            last_login: user.last_login,
            registered_devices,
        },
        recent_logins: recent_logins.into_iter().map(LoginLogResponse::from).collect(),
        device_limit: user.max_devices,
    })))
}

/// Close a session opened by login
///
/// Always succeeds: a missing, malformed or unknown `loginId` is ignored.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "auth",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 400, description = "Malformed JSON body"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, body: Bytes) -> Result<Json<MessageResponse>> {
    // The body is optional, so it is parsed by hand rather than through a Json extractor
    let request: LogoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| Error::BadRequest {
            message: format!("Invalid JSON body: {e}"),
            code: ErrorCode::ValidationError,
        })?
    };

    if let Some(login_id) = request.login_id.as_deref().and_then(|id| Uuid::parse_str(id).ok()) {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        match LoginLogs::new(&mut conn).close(login_id).await? {
            Some(log) => debug!(
                login_id = %abbrev_uuid(&log.id),
                session_duration = log.session_duration,
                "Closed session"
            ),
            None => debug!(login_id = %abbrev_uuid(&login_id), "Logout for unknown session"),
        }
    }

    Ok(Json(MessageResponse::new("Logout successful")))
}
