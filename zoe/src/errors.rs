use crate::db::errors::DbError;
use crate::types::Role;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Serialize, Serializer};
use serde_json::json;
use std::fmt;
use thiserror::Error as ThisError;

macro_rules! error_codes {
    ($($variant:ident => $code:literal),* $(,)?) => {
        /// Machine-readable error code included in every error body.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorCode {
            $($variant),*
        }

        impl ErrorCode {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(ErrorCode::$variant => $code),*
                }
            }
        }
    };
}

error_codes! {
    ApiKeyRequired => "API_KEY_REQUIRED",
    InvalidApiKey => "INVALID_API_KEY",
    InvalidToken => "INVALID_TOKEN",
    AuthServerError => "AUTH_SERVER_ERROR",
    InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
    DeviceLimitExceeded => "DEVICE_LIMIT_EXCEEDED",
    RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
    AuthRateLimitExceeded => "AUTH_RATE_LIMIT_EXCEEDED",
    AdminRateLimitExceeded => "ADMIN_RATE_LIMIT_EXCEEDED",
    MissingCredentials => "MISSING_CREDENTIALS",
    InvalidCredentials => "INVALID_CREDENTIALS",
    LoginServerError => "LOGIN_SERVER_ERROR",
    UserIdRequired => "USER_ID_REQUIRED",
    UserNotFound => "USER_NOT_FOUND",
    MissingRequiredFields => "MISSING_REQUIRED_FIELDS",
    UserExists => "USER_EXISTS",
    CreateUserError => "CREATE_USER_ERROR",
    AccessDenied => "ACCESS_DENIED",
    UpdateDenied => "UPDATE_DENIED",
    SelfDeleteNotAllowed => "SELF_DELETE_NOT_ALLOWED",
    GroupNameRequired => "GROUP_NAME_REQUIRED",
    GroupExists => "GROUP_EXISTS",
    CreateGroupError => "CREATE_GROUP_ERROR",
    GroupNotFound => "GROUP_NOT_FOUND",
    GroupAccessDenied => "GROUP_ACCESS_DENIED",
    NoInvitePermission => "NO_INVITE_PERMISSION",
    NoRemovePermission => "NO_REMOVE_PERMISSION",
    AlreadyMember => "ALREADY_MEMBER",
    NotAMember => "NOT_A_MEMBER",
    GroupFull => "GROUP_FULL",
    DeviceNotFound => "DEVICE_NOT_FOUND",
    NotificationNotFound => "NOTIFICATION_NOT_FOUND",
    InvalidPassword => "INVALID_PASSWORD",
    ValidationError => "VALIDATION_ERROR",
    DuplicateEntry => "DUPLICATE_ENTRY",
    EndpointNotFound => "ENDPOINT_NOT_FOUND",
    NotFound => "NOT_FOUND",
    InternalError => "INTERNAL_ERROR",
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided, or provided credentials are invalid
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String>, code: ErrorCode },

    /// User's platform role is not one of the roles the route requires
    #[error("Role {actual} is not permitted, requires one of {required:?}")]
    InsufficientPermissions { required: Vec<Role>, actual: Role },

    /// Authenticated, but the resource-level rules deny access
    #[error("{message}")]
    Forbidden { message: String, code: ErrorCode },

    /// Login from an unregistered device when the user's device slots are full
    #[error("Device limit of {max_devices} reached")]
    DeviceLimitExceeded { max_devices: i64 },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String, code: ErrorCode },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String, code: ErrorCode },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String, code: ErrorCode },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Rate limit exceeded
    #[error("{message}")]
    TooManyRequests {
        message: String,
        code: ErrorCode,
        retry_after_secs: u64,
    },

    /// No route matched the request
    #[error("No endpoint matches {path}")]
    EndpointNotFound { path: String },
}

impl Error {
    /// Shorthand for an internal error with the generic `INTERNAL_ERROR` code.
    pub fn internal(operation: impl Into<String>) -> Self {
        Error::Internal {
            operation: operation.into(),
            code: ErrorCode::InternalError,
        }
    }

    /// Replace the code of a server-side failure with an operation-specific one.
    ///
    /// Client errors pass through untouched.
    pub fn with_server_code(self, code: ErrorCode) -> Self {
        if self.status_code().is_server_error() {
            Error::Internal {
                operation: format!("{self:#}"),
                code,
            }
        } else {
            self
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } | Error::Forbidden { .. } | Error::DeviceLimitExceeded { .. } => {
                StatusCode::FORBIDDEN
            }
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } | Error::EndpointNotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Unauthenticated { code, .. }
            | Error::Forbidden { code, .. }
            | Error::BadRequest { code, .. }
            | Error::NotFound { code, .. }
            | Error::Internal { code, .. }
            | Error::TooManyRequests { code, .. } => *code,
            Error::InsufficientPermissions { .. } => ErrorCode::InsufficientPermissions,
            Error::DeviceLimitExceeded { .. } => ErrorCode::DeviceLimitExceeded,
            Error::EndpointNotFound { .. } => ErrorCode::EndpointNotFound,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => ErrorCode::NotFound,
                DbError::UniqueViolation { table, .. } => match table.as_deref() {
                    Some("users") => ErrorCode::UserExists,
                    Some("groups") => ErrorCode::GroupExists,
                    Some("group_members") => ErrorCode::AlreadyMember,
                    _ => ErrorCode::DuplicateEntry,
                },
                DbError::ForeignKeyViolation { .. } | DbError::CheckViolation { .. } => ErrorCode::ValidationError,
                DbError::Other(_) => ErrorCode::InternalError,
            },
            Error::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message, .. } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { .. } => "You do not have permission to access this resource".to_string(),
            Error::Forbidden { message, .. } => message.clone(),
            Error::DeviceLimitExceeded { max_devices } => {
                format!("Maximum number of registered devices ({max_devices}) reached")
            }
            Error::BadRequest { message, .. } => message.clone(),
            Error::NotFound { resource, .. } => format!("{resource} not found"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { table, column, .. } => match (table.as_deref(), column.as_deref()) {
                    (Some("users"), Some("email")) => "An account with this email address already exists".to_string(),
                    (Some("users"), Some("username")) => "This username is already taken".to_string(),
                    (Some("users"), _) => "Username or email already exists".to_string(),
                    (Some("groups"), _) => "A group with this name already exists".to_string(),
                    (Some("group_members"), _) => "User is already a member of this group".to_string(),
                    _ => "Resource already exists".to_string(),
                },
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
            Error::TooManyRequests { message, .. } => message.clone(),
            Error::EndpointNotFound { .. } => "Endpoint not found".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. }
            | Error::InsufficientPermissions { .. }
            | Error::Forbidden { .. }
            | Error::DeviceLimitExceeded { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::TooManyRequests { .. } => {
                tracing::warn!("Rate limit error: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::EndpointNotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let mut body = json!({
            "success": false,
            "error": self.user_message(),
            "code": self.code(),
        });

        // Some errors carry extra structured context for clients
        let mut retry_after = None;
        match &self {
            Error::InsufficientPermissions { required, actual } => {
                body["requiredRoles"] = json!(required);
                body["userRole"] = json!(actual);
            }
            Error::DeviceLimitExceeded { max_devices } => {
                body["maxDevices"] = json!(max_devices);
            }
            Error::TooManyRequests { retry_after_secs, .. } => {
                body["retryAfter"] = json!(retry_after_secs);
                retry_after = Some(*retry_after_secs);
            }
            Error::EndpointNotFound { path } => {
                body["requestedUrl"] = json!(path);
                body["suggestion"] = json!("Try GET / to list the available endpoints");
            }
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
