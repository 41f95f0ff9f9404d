use crate::types::{GroupId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Who can discover a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum GroupType {
    /// Listed for everyone
    Public,
    /// Listed for members only
    #[default]
    Private,
    /// Listed for members only, and hidden from non-members on direct lookup
    Secret,
}

/// Who can read a group's content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ContentVisibility {
    #[default]
    MembersOnly,
    Public,
}

/// Role of a user inside a single group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Moderator,
    #[default]
    Member,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct GroupSettings {
    pub require_approval: bool,
    pub allow_invites: bool,
    #[schema(minimum = 1)]
    pub max_members: i64,
    pub content_visibility: ContentVisibility,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            require_approval: true,
            allow_invites: true,
            max_members: 100,
            content_visibility: ContentVisibility::MembersOnly,
        }
    }
}

/// Per-member permission flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberPermissions {
    pub can_post: bool,
    pub can_comment: bool,
    pub can_invite: bool,
    pub can_remove: bool,
    pub can_manage_settings: bool,
}

impl MemberPermissions {
    /// Every permission, as granted to a group's creator.
    pub fn all() -> Self {
        Self {
            can_post: true,
            can_comment: true,
            can_invite: true,
            can_remove: true,
            can_manage_settings: true,
        }
    }
}

impl Default for MemberPermissions {
    fn default() -> Self {
        Self {
            can_post: true,
            can_comment: true,
            can_invite: false,
            can_remove: false,
            can_manage_settings: false,
        }
    }
}

/// Database request for creating a new group
#[derive(Debug, Clone)]
pub struct GroupCreateDBRequest {
    pub name: String,
    pub description: Option<String>,
    pub group_type: GroupType,
    pub settings: GroupSettings,
    pub created_by: UserId,
}

/// Database request for updating a group
#[derive(Debug, Clone, Default)]
pub struct GroupUpdateDBRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub group_type: Option<GroupType>,
    pub require_approval: Option<bool>,
    pub allow_invites: Option<bool>,
    pub max_members: Option<i64>,
    pub content_visibility: Option<ContentVisibility>,
}

/// Database response for a group
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupDBResponse {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub group_type: GroupType,
    pub settings: GroupSettings,
    pub created_by: UserId,
    pub post_count: i64,
    pub member_count: i64,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database request for adding a member to a group
#[derive(Debug, Clone)]
pub struct MemberCreateDBRequest {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub invited_by: Option<UserId>,
    pub permissions: MemberPermissions,
}

/// Database response for a group membership, joined with the member's username
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberDBResponse {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub username: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub invited_by: Option<UserId>,
    pub post_count: i64,
    pub last_active: DateTime<Utc>,
    pub permissions: MemberPermissions,
}
