//! API request and response data models.
//!
//! These structs define the public JSON contract. They are distinct from the database models
//! in [`crate::db::models`] and convert from them with `From` impls. Field names are
//! camelCase on the wire.
//!
//! Successful responses share an envelope: `{"success": true, "message"?: ..., "data": ...}`
//! ([`ApiResponse`]) or, for lists, `{"success": true, "data": [...], "pagination": {...}}`
//! ([`pagination::PaginatedResponse`]).

use serde::Serialize;
use utoipa::ToSchema;

pub mod auth;
pub mod groups;
pub mod login_logs;
pub mod notifications;
pub mod pagination;
pub mod system;
pub mod users;

/// Success envelope for single-resource responses
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiResponse<T: ToSchema> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T: ToSchema> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data,
        }
    }
}

/// Success envelope for operations that return no data
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
