use crate::{
    AppState,
    api::{extract::ClientInfo, models::users::CurrentUser},
    auth::session,
    config::Config,
    db::{
        errors::DbError,
        handlers::{LoginLogs, Repository, Users},
        models::login_logs::{FailureReason, LoginLogCreateDBRequest, LoginStatus},
    },
    errors::{Error, ErrorCode, Result},
    types::abbrev_uuid,
};
use axum::{
    extract::{FromRequestParts, Query},
    http::{header, request::Parts},
};
use std::collections::HashMap;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

fn invalid_api_key() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid API key".to_string()),
        code: ErrorCode::InvalidApiKey,
    }
}

/// Extract the bearer token from the `Authorization` header
/// Returns:
/// - None: no `Authorization` header, or not a Bearer token
/// - Some(Ok(token)): a bearer token is present
/// - Some(Err(error)): the header is present but unreadable
fn bearer_token(parts: &Parts) -> Option<Result<&str>> {
    let auth_header = parts.headers.get(header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(_) => {
            return Some(Err(Error::Unauthenticated {
                message: Some("Invalid authorization header".to_string()),
                code: ErrorCode::InvalidToken,
            }));
        }
    };

    auth_str.strip_prefix("Bearer ").map(|token| Ok(token.trim()))
}

/// Find the API key in the configured header, falling back to the query string
fn api_key(parts: &Parts, config: &Config) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(config.auth.api_key.header_name.as_str())
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }

    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri).ok()?;
    params
        .get(&config.auth.api_key.query_param)
        .filter(|v| !v.is_empty())
        .cloned()
}

/// Authenticate a session token issued by `/auth/login`
/// Returns:
/// - None: no bearer token present
/// - Some(Ok(user)): the token verified and its user is still active
/// - Some(Err(error)): the token is invalid, expired, or its user has been deactivated
#[instrument(skip(parts, state))]
async fn try_session_auth(parts: &Parts, state: &AppState) -> Option<Result<CurrentUser>> {
    let token = match bearer_token(parts)? {
        Ok(token) => token,
        Err(e) => return Some(Err(e)),
    };

    let claims = match session::verify_session_token(token, &state.config) {
        Ok(claims) => claims,
        Err(e) => return Some(Err(e)),
    };

    let mut conn = match state.db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(Error::from(DbError::from(e)).with_server_code(ErrorCode::AuthServerError))),
    };

    match Users::new(&mut conn).get_active_by_id(claims.sub).await {
        Ok(Some(user)) => Some(Ok(CurrentUser::from(user))),
        Ok(None) => Some(Err(Error::Unauthenticated {
            message: Some("Session is no longer valid".to_string()),
            code: ErrorCode::InvalidToken,
        })),
        Err(e) => Some(Err(Error::from(e).with_server_code(ErrorCode::AuthServerError))),
    }
}

/// Authenticate with an API key (the user's id), recording the attempt in the login log
/// Returns:
/// - None: no API key present
/// - Some(Ok(user)): the key belongs to an active user
/// - Some(Err(error)): the key is unknown, or a storage error occurred
#[instrument(skip(parts, state))]
async fn try_api_key_auth(parts: &Parts, state: &AppState) -> Option<Result<CurrentUser>> {
    let key = api_key(parts, &state.config)?;
    let client = ClientInfo::from_parts(parts);

    Some(
        authenticate_api_key(&key, &client, state)
            .await
            .map_err(|e| e.with_server_code(ErrorCode::AuthServerError)),
    )
}

async fn authenticate_api_key(key: &str, client: &ClientInfo, state: &AppState) -> Result<CurrentUser> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let user = match Uuid::parse_str(key) {
        Ok(user_id) => Users::new(&mut tx).get_active_by_id(user_id).await?,
        Err(_) => None,
    };

    let Some(user) = user else {
        warn!(ip = %client.ip_address, "Rejected invalid API key");
        LoginLogs::new(&mut tx)
            .create(
                &LoginLogCreateDBRequest::rejected(
                    None,
                    client.ip_address.clone(),
                    LoginStatus::Failed,
                    FailureReason::InvalidApiKey,
                )
                .with_user_agent(client.user_agent.clone()),
            )
            .await?;
        tx.commit().await.map_err(DbError::from)?;
        return Err(invalid_api_key());
    };

    if state.config.auth.api_key.record_requests {
        LoginLogs::new(&mut tx)
            .create(
                &LoginLogCreateDBRequest::success(user.id, client.ip_address.clone())
                    .with_user_agent(client.user_agent.clone()),
            )
            .await?;
        Users::new(&mut tx).record_login(user.id).await?;
    }
    tx.commit().await.map_err(DbError::from)?;

    debug!(user_id = %abbrev_uuid(&user.id), "Authenticated with API key");
    Ok(CurrentUser::from(user))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        // Each method returns Option<Result<CurrentUser>>:
        // - None means the method is not applicable (no credentials present)
        // - Some(Ok(user)) means successful authentication
        // - Some(Err(error)) means credentials were present but invalid
        //
        // A presented credential that fails is final: we do not fall through to weaker methods.

        match try_session_auth(parts, state).await {
            Some(Ok(user)) => {
                debug!("Found session authenticated user: {}", abbrev_uuid(&user.id));
                return Ok(user);
            }
            Some(Err(e)) => {
                trace!("Session authentication failed: {:?}", e);
                return Err(e);
            }
            None => trace!("No session token presented"),
        }

        match try_api_key_auth(parts, state).await {
            Some(result) => result,
            None => {
                trace!("No authentication credentials found in request");
                Err(Error::Unauthenticated {
                    message: Some("API key required".to_string()),
                    code: ErrorCode::ApiKeyRequired,
                })
            }
        }
    }
}
