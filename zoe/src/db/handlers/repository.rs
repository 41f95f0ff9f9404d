//! The CRUD surface shared by the table repositories.

use std::collections::HashMap;

use crate::db::errors::Result;

/// CRUD over one table, borrowed from a connection or transaction.
///
/// Implemented by [`Users`](super::Users), [`Groups`](super::Groups),
/// [`LoginLogs`](super::LoginLogs) and [`Notifications`](super::Notifications). Table-specific
/// queries (visibility filters, session closing, inbox counts) are inherent methods on each
/// repository; [`Devices`](super::Devices) only has those.
#[async_trait::async_trait]
pub trait Repository {
    type CreateRequest;
    /// Partial update; `None` fields keep their stored value
    type UpdateRequest;
    type Response;
    type Id: Send + Sync;
    /// Pagination plus whatever narrowing the table supports
    type Filter: Send + Sync;

    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>>;

    /// Look up many rows at once, keyed by id. Missing ids are absent from the map.
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>>;

    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Hard delete. Returns whether a row was removed.
    async fn delete(&mut self, id: Self::Id) -> Result<bool>;

    /// Errors with [`DbError::NotFound`](crate::db::errors::DbError::NotFound) if the row is gone
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response>;
}
