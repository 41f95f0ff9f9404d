//! Shared pagination types for list endpoints.
//!
//! List endpoints take `page` (1-based) and `limit` query parameters and answer with a
//! `pagination` block next to the data.

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Default number of items to return per page.
pub const DEFAULT_LIMIT: i64 = 20;

/// Maximum number of items that can be requested per page.
pub const MAX_LIMIT: i64 = 100;

/// Page-based pagination parameters.
///
/// `page` is clamped to at least 1 and `limit` to `1..=100`, so a bad value degrades to a
/// sensible page rather than an error.
#[serde_as]
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct Pagination {
    /// Page number, starting at 1 (default: 1)
    #[param(default = 1, minimum = 1)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub page: Option<i64>,

    /// Maximum number of items to return (default: 20, max: 100)
    #[param(default = 20, minimum = 1, maximum = 100)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub limit: Option<i64>,
}

impl Pagination {
    #[inline]
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    /// Get the limit value, clamped between 1 and MAX_LIMIT.
    #[inline]
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    /// Number of rows to skip for the requested page.
    #[inline]
    pub fn skip(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// Get both skip and limit as a tuple, useful for destructuring.
    #[inline]
    pub fn params(&self) -> (i64, i64) {
        (self.skip(), self.limit())
    }
}

/// Pagination metadata returned alongside a page of results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PaginationInfo {
    pub page: i64,
    pub limit: i64,
    /// Total number of items matching the query (before pagination)
    pub total: i64,
    /// Number of pages at this limit
    pub pages: i64,
}

impl PaginationInfo {
    pub fn new(pagination: &Pagination, total: i64) -> Self {
        let limit = pagination.limit();
        Self {
            page: pagination.page(),
            limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}

/// Generic paginated response wrapper for list endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginatedResponse<T: ToSchema> {
    pub success: bool,
    /// The items for the current page
    pub data: Vec<T>,
    pub pagination: PaginationInfo,
}

impl<T: ToSchema> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: &Pagination) -> Self {
        Self {
            success: true,
            data,
            pagination: PaginationInfo::new(pagination, total),
        }
    }
}
