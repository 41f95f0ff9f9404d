//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//! - **[`extract`]**: Extractors that render rejections as the standard error body
//!
//! # API Structure
//!
//! Everything except the index at `/` lives under `/api/v1`:
//!
//! - **Authentication** (`/auth/*`): login, session summary, logout
//! - **Users** (`/users/*`): accounts, password changes, devices, login history
//! - **Groups** (`/groups/*`): groups and memberships
//! - **Notifications** (`/notifications/*`): the caller's inbox
//! - **Health** (`/health`)
//!
//! # OpenAPI Documentation
//!
//! Handlers carry `utoipa` annotations collected in [`crate::openapi::ApiDoc`]. The rendered
//! documentation is at `/api/v1/docs`.

pub mod extract;
pub mod handlers;
pub mod models;
