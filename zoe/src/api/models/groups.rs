//! API request/response models for groups.

use super::pagination::Pagination;
use crate::db::models::groups::{
    ContentVisibility, GroupDBResponse, GroupSettings, GroupType, MemberDBResponse, MemberPermissions, MemberRole,
};
use crate::types::{GroupId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for listing groups
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ListGroupsQuery {
    /// Pagination parameters
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only groups of this type
    #[serde(rename = "type")]
    pub group_type: Option<GroupType>,

    /// Search query to filter groups by name or description (case-insensitive substring match)
    pub search: Option<String>,
}

/// Request body for creating a new group.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupCreate {
    /// Display name for the group (must be unique)
    #[schema(example = "Trail Runners")]
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub group_type: Option<GroupType>,
    pub settings: Option<GroupSettings>,
    /// Users to add as plain members. Unknown or inactive ids are skipped.
    #[schema(value_type = Option<Vec<String>>)]
    pub member_ids: Option<Vec<UserId>>,
}

/// Partial settings update; absent fields are unchanged
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettingsUpdate {
    pub require_approval: Option<bool>,
    pub allow_invites: Option<bool>,
    #[schema(minimum = 1)]
    pub max_members: Option<i64>,
    pub content_visibility: Option<ContentVisibility>,
}

/// Request body for updating an existing group. Only provided fields are updated.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub group_type: Option<GroupType>,
    pub settings: Option<GroupSettingsUpdate>,
}

/// Request body for adding a member
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
}

/// Group summary returned by list endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub group_type: GroupType,
    pub settings: GroupSettings,
    #[schema(value_type = String, format = "uuid")]
    pub created_by: UserId,
    pub post_count: i64,
    pub member_count: i64,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GroupDBResponse> for GroupResponse {
    fn from(db: GroupDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            description: db.description,
            group_type: db.group_type,
            settings: db.settings,
            created_by: db.created_by,
            post_count: db.post_count,
            member_count: db.member_count,
            last_activity: db.last_activity,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub username: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub invited_by: Option<UserId>,
    pub post_count: i64,
    pub last_active: DateTime<Utc>,
    pub permissions: MemberPermissions,
}

impl From<MemberDBResponse> for MemberResponse {
    fn from(db: MemberDBResponse) -> Self {
        Self {
            user_id: db.user_id,
            username: db.username,
            role: db.role,
            joined_at: db.joined_at,
            invited_by: db.invited_by,
            post_count: db.post_count,
            last_active: db.last_active,
            permissions: db.permissions,
        }
    }
}

/// A group together with its member list
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupDetailResponse {
    #[serde(flatten)]
    pub group: GroupResponse,
    pub members: Vec<MemberResponse>,
}

impl GroupDetailResponse {
    pub fn new(group: GroupDBResponse, members: Vec<MemberDBResponse>) -> Self {
        Self {
            group: group.into(),
            members: members.into_iter().map(MemberResponse::from).collect(),
        }
    }
}
