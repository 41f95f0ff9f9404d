//! HTTP request handlers for all API endpoints.
//!
//! This module contains Axum route handlers organized by resource type.
//! Each handler is responsible for:
//! - Request validation and deserialization
//! - Authentication and authorization checks
//! - Business logic execution via database repositories
//! - Response serialization
//!
//! # Handler Modules
//!
//! - [`auth`]: Login with device registration, session lookup and logout
//! - [`groups`]: Group CRUD and membership management
//! - [`notifications`]: The caller's inbox and sending notifications
//! - [`system`]: API info, health check and the JSON 404 fallback
//! - [`users`]: User CRUD, password changes, devices and login history
//!
//! # Authentication
//!
//! Most handlers take [`crate::api::models::users::CurrentUser`] or
//! [`crate::auth::permissions::RequiresRole`] as an extractor; see [`crate::auth`].
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`] which automatically converts to
//! appropriate HTTP status codes and JSON error responses.

pub mod auth;
pub mod groups;
pub mod notifications;
pub mod system;
pub mod users;
