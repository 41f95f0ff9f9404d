use std::collections::HashSet;

use axum::{Json, extract::State, http::StatusCode};
use tracing::info;

use crate::{
    AppState,
    api::{
        extract::{ApiJson, ApiPath, ApiQuery},
        models::{
            ApiResponse, MessageResponse,
            groups::{AddMemberRequest, GroupCreate, GroupDetailResponse, GroupResponse, GroupUpdate, ListGroupsQuery},
            pagination::PaginatedResponse,
            users::CurrentUser,
        },
    },
    auth::permissions::{AdminOnly, AdminOrModerator, RequiresRole},
    db::{
        errors::DbError,
        handlers::{Groups, Repository, Users, groups::GroupFilter},
        models::groups::{
            GroupCreateDBRequest, GroupDBResponse, GroupSettings, GroupType, GroupUpdateDBRequest, MemberCreateDBRequest,
            MemberDBResponse, MemberPermissions, MemberRole,
        },
    },
    errors::{Error, ErrorCode, Result},
    types::{GroupId, UserId, abbrev_uuid},
};

const NAME_LENGTH: std::ops::RangeInclusive<usize> = 2..=50;
const MAX_DESCRIPTION_LENGTH: usize = 500;

fn group_not_found(id: GroupId) -> Error {
    Error::NotFound {
        resource: "Group".to_string(),
        id: id.to_string(),
        code: ErrorCode::GroupNotFound,
    }
}

fn validation_error(message: impl Into<String>) -> Error {
    Error::BadRequest {
        message: message.into(),
        code: ErrorCode::ValidationError,
    }
}

fn group_full(max_members: i64) -> Error {
    Error::BadRequest {
        message: format!("Group has reached its member limit of {max_members}"),
        code: ErrorCode::GroupFull,
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if !NAME_LENGTH.contains(&name.chars().count()) {
        return Err(validation_error("Group name must be between 2 and 50 characters"));
    }
    Ok(name.to_string())
}

fn validate_description(description: &str) -> Result<String> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(validation_error("Description cannot exceed 500 characters"));
    }
    Ok(description.to_string())
}

fn validate_max_members(max_members: i64) -> Result<i64> {
    if max_members < 1 {
        return Err(validation_error("maxMembers must be at least 1"));
    }
    Ok(max_members)
}

/// Fetch a group and the caller's membership in it
async fn group_with_membership(
    state: &AppState,
    group_id: GroupId,
    user_id: UserId,
) -> Result<(GroupDBResponse, Option<MemberDBResponse>)> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut conn);
    let group = repo.get_by_id(group_id).await?.ok_or_else(|| group_not_found(group_id))?;
    let membership = repo.get_member(group_id, user_id).await?;
    Ok((group, membership))
}

/// List groups visible to the caller
///
/// Admins see every group; everyone else sees public groups plus the groups they belong to.
#[utoipa::path(
    get,
    path = "/groups",
    tag = "groups",
    params(ListGroupsQuery),
    responses(
        (status = 200, description = "Paginated list of groups", body = PaginatedResponse<GroupResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_groups(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiQuery(query): ApiQuery<ListGroupsQuery>,
) -> Result<Json<PaginatedResponse<GroupResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut filter = GroupFilter::new(skip, limit);
    if let Some(group_type) = query.group_type {
        filter = filter.with_type(group_type);
    }
    if let Some(search) = query.search.filter(|s| !s.trim().is_empty()) {
        filter = filter.with_search(search.trim().to_string());
    }
    if !current_user.is_admin() {
        filter = filter.visible_to(current_user.id);
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut conn);
    let groups = repo.list(&filter).await?;
    let total = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        groups.into_iter().map(GroupResponse::from).collect(),
        total,
        &query.pagination,
    )))
}

/// Create a group
///
/// The creator joins as a group admin with every permission. `memberIds` are deduplicated and
/// unknown or inactive users are skipped.
#[utoipa::path(
    post,
    path = "/groups",
    tag = "groups",
    request_body = GroupCreate,
    responses(
        (status = 201, description = "Group created", body = ApiResponse<GroupDetailResponse>),
        (status = 400, description = "Missing name, invalid data, duplicate name, or too many members"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin or moderator role required"),
        (status = 500, description = "Internal server error"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_group(
    State(state): State<AppState>,
    RequiresRole(creator, ..): RequiresRole<AdminOrModerator>,
    ApiJson(create): ApiJson<GroupCreate>,
) -> Result<(StatusCode, Json<ApiResponse<GroupDetailResponse>>)> {
    let Some(name) = create.name.as_deref().filter(|n| !n.trim().is_empty()) else {
        return Err(Error::BadRequest {
            message: "Group name is required".to_string(),
            code: ErrorCode::GroupNameRequired,
        });
    };
    let settings = create.settings.unwrap_or_default();
    let request = GroupCreateDBRequest {
        name: validate_name(name)?,
        description: create
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?
            .filter(|d| !d.is_empty()),
        group_type: create.group_type.unwrap_or_default(),
        settings: GroupSettings {
            max_members: validate_max_members(settings.max_members)?,
            ..settings
        },
        created_by: creator.id,
    };

    let detail = create_group_with_members(&state, &request, create.member_ids.unwrap_or_default())
        .await
        .map_err(|e| e.with_server_code(ErrorCode::CreateGroupError))?;

    info!(
        group_id = %abbrev_uuid(&detail.group.id),
        created_by = %abbrev_uuid(&creator.id),
        members = detail.members.len(),
        "Group created"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Group created successfully", detail)),
    ))
}

async fn create_group_with_members(
    state: &AppState,
    request: &GroupCreateDBRequest,
    member_ids: Vec<UserId>,
) -> Result<GroupDetailResponse> {
    let mut seen = HashSet::from([request.created_by]);
    let candidates: Vec<UserId> = member_ids.into_iter().filter(|id| seen.insert(*id)).collect();

    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let active = Users::new(&mut tx).get_bulk(candidates.clone()).await?;
    let members: Vec<UserId> = candidates
        .into_iter()
        .filter(|id| active.get(id).is_some_and(|u| u.is_active))
        .collect();

    if members.len() as i64 + 1 > request.settings.max_members {
        return Err(group_full(request.settings.max_members));
    }

    let mut repo = Groups::new(&mut tx);
    let group = repo.create(request).await?;
    repo.add_member(&MemberCreateDBRequest {
        group_id: group.id,
        user_id: request.created_by,
        role: MemberRole::Admin,
        invited_by: None,
        permissions: MemberPermissions::all(),
    })
    .await?;
    for user_id in members {
        repo.add_member(&MemberCreateDBRequest {
            group_id: group.id,
            user_id,
            role: MemberRole::Member,
            invited_by: Some(request.created_by),
            permissions: MemberPermissions::default(),
        })
        .await?;
    }

    let group = repo.get_by_id(group.id).await?.ok_or(DbError::NotFound)?;
    let members = repo.list_members(group.id).await?;
    tx.commit().await.map_err(DbError::from)?;

    Ok(GroupDetailResponse::new(group, members))
}

/// Get a group with its members
///
/// Secret groups are only visible to their members and platform admins.
#[utoipa::path(
    get,
    path = "/groups/{group_id}",
    tag = "groups",
    params(("group_id" = String, Path, description = "Group ID (UUID)")),
    responses(
        (status = 200, description = "Group details", body = ApiResponse<GroupDetailResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Secret group"),
        (status = 404, description = "Group not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_group(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(group_id): ApiPath<GroupId>,
) -> Result<Json<ApiResponse<GroupDetailResponse>>> {
    let (group, membership) = group_with_membership(&state, group_id, current_user.id).await?;

    if group.group_type == GroupType::Secret && membership.is_none() && !current_user.is_admin() {
        return Err(Error::Forbidden {
            message: "Access denied to this group".to_string(),
            code: ErrorCode::GroupAccessDenied,
        });
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let members = Groups::new(&mut conn).list_members(group.id).await?;

    Ok(Json(ApiResponse::new(GroupDetailResponse::new(group, members))))
}

/// Update a group's details and settings
///
/// Allowed for platform admins and members holding `canManageSettings`.
#[utoipa::path(
    put,
    path = "/groups/{group_id}",
    tag = "groups",
    request_body = GroupUpdate,
    params(("group_id" = String, Path, description = "Group ID (UUID)")),
    responses(
        (status = 200, description = "Group updated", body = ApiResponse<GroupDetailResponse>),
        (status = 400, description = "Invalid data or duplicate name"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to manage this group"),
        (status = 404, description = "Group not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_group(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(group_id): ApiPath<GroupId>,
    ApiJson(update): ApiJson<GroupUpdate>,
) -> Result<Json<ApiResponse<GroupDetailResponse>>> {
    let (group, membership) = group_with_membership(&state, group_id, current_user.id).await?;

    let can_manage = current_user.is_admin() || membership.is_some_and(|m| m.permissions.can_manage_settings);
    if !can_manage {
        return Err(Error::Forbidden {
            message: "You do not have permission to manage this group".to_string(),
            code: ErrorCode::GroupAccessDenied,
        });
    }

    let settings = update.settings.unwrap_or_default();
    let max_members = settings.max_members.map(validate_max_members).transpose()?;
    if let Some(max_members) = max_members
        && max_members < group.member_count
    {
        return Err(validation_error(format!(
            "maxMembers cannot be below the current member count ({})",
            group.member_count
        )));
    }

    let request = GroupUpdateDBRequest {
        name: update.name.as_deref().map(validate_name).transpose()?,
        description: update.description.as_deref().map(validate_description).transpose()?,
        group_type: update.group_type,
        require_approval: settings.require_approval,
        allow_invites: settings.allow_invites,
        max_members,
        content_visibility: settings.content_visibility,
    };

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut tx);
    let group = repo.update(group_id, &request).await?;
    let members = repo.list_members(group.id).await?;
    tx.commit().await.map_err(DbError::from)?;

    Ok(Json(ApiResponse::with_message(
        "Group updated successfully",
        GroupDetailResponse::new(group, members),
    )))
}

/// Add a member to a group
///
/// Allowed for platform admins and members holding `canInvite`.
#[utoipa::path(
    post,
    path = "/groups/{group_id}/members",
    tag = "groups",
    request_body = AddMemberRequest,
    params(("group_id" = String, Path, description = "Group ID (UUID)")),
    responses(
        (status = 200, description = "Member added", body = ApiResponse<GroupDetailResponse>),
        (status = 400, description = "Already a member, or the group is full"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No invite permission"),
        (status = 404, description = "Group or user not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_member(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(group_id): ApiPath<GroupId>,
    ApiJson(request): ApiJson<AddMemberRequest>,
) -> Result<Json<ApiResponse<GroupDetailResponse>>> {
    let (group, membership) = group_with_membership(&state, group_id, current_user.id).await?;

    let can_invite = current_user.is_admin() || membership.is_some_and(|m| m.permissions.can_invite);
    if !can_invite {
        return Err(Error::Forbidden {
            message: "You do not have permission to invite members".to_string(),
            code: ErrorCode::NoInvitePermission,
        });
    }

    let Some(user_id) = request.user_id else {
        return Err(Error::BadRequest {
            message: "userId is required".to_string(),
            code: ErrorCode::MissingRequiredFields,
        });
    };

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    if Users::new(&mut tx).get_active_by_id(user_id).await?.is_none() {
        return Err(Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
            code: ErrorCode::UserNotFound,
        });
    }

    let mut repo = Groups::new(&mut tx);
    if repo.get_member(group_id, user_id).await?.is_some() {
        return Err(Error::BadRequest {
            message: "User is already a member of this group".to_string(),
            code: ErrorCode::AlreadyMember,
        });
    }
    if repo.member_count(group_id).await? >= group.settings.max_members {
        return Err(group_full(group.settings.max_members));
    }

    repo.add_member(&MemberCreateDBRequest {
        group_id,
        user_id,
        role: MemberRole::Member,
        invited_by: Some(current_user.id),
        permissions: MemberPermissions::default(),
    })
    .await?;
    repo.touch_activity(group_id).await?;

    let group = repo.get_by_id(group_id).await?.ok_or_else(|| group_not_found(group_id))?;
    let members = repo.list_members(group_id).await?;
    tx.commit().await.map_err(DbError::from)?;

    info!(
        group_id = %abbrev_uuid(&group_id),
        user_id = %abbrev_uuid(&user_id),
        invited_by = %abbrev_uuid(&current_user.id),
        "Member added"
    );

    Ok(Json(ApiResponse::with_message(
        "Member added successfully",
        GroupDetailResponse::new(group, members),
    )))
}

/// Remove a member from a group, or leave it
///
/// Allowed for platform admins, members holding `canRemove`, and the member themself.
#[utoipa::path(
    delete,
    path = "/groups/{group_id}/members/{user_id}",
    tag = "groups",
    params(
        ("group_id" = String, Path, description = "Group ID (UUID)"),
        ("user_id" = String, Path, description = "User ID (UUID)"),
    ),
    responses(
        (status = 200, description = "Member removed", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No remove permission"),
        (status = 404, description = "Group not found, or the user is not a member"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_member(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath((group_id, user_id)): ApiPath<(GroupId, UserId)>,
) -> Result<Json<MessageResponse>> {
    let (_, membership) = group_with_membership(&state, group_id, current_user.id).await?;

    let can_remove = current_user.id == user_id
        || current_user.is_admin()
        || membership.is_some_and(|m| m.permissions.can_remove);
    if !can_remove {
        return Err(Error::Forbidden {
            message: "You do not have permission to remove members".to_string(),
            code: ErrorCode::NoRemovePermission,
        });
    }

    let mut tx = state.db.begin().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut tx);
    if !repo.remove_member(group_id, user_id).await? {
        return Err(Error::NotFound {
            resource: "Member".to_string(),
            id: user_id.to_string(),
            code: ErrorCode::NotAMember,
        });
    }
    repo.touch_activity(group_id).await?;
    tx.commit().await.map_err(DbError::from)?;

    info!(
        group_id = %abbrev_uuid(&group_id),
        user_id = %abbrev_uuid(&user_id),
        removed_by = %abbrev_uuid(&current_user.id),
        "Member removed"
    );
    Ok(Json(MessageResponse::new("Member removed successfully")))
}

/// Delete a group and its memberships
#[utoipa::path(
    delete,
    path = "/groups/{group_id}",
    tag = "groups",
    params(("group_id" = String, Path, description = "Group ID (UUID)")),
    responses(
        (status = 200, description = "Group deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Group not found"),
    ),
    security(("ApiKey" = []), ("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_group(
    State(state): State<AppState>,
    RequiresRole(admin, ..): RequiresRole<AdminOnly>,
    ApiPath(group_id): ApiPath<GroupId>,
) -> Result<Json<MessageResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    if !Groups::new(&mut conn).delete(group_id).await? {
        return Err(group_not_found(group_id));
    }

    info!(group_id = %abbrev_uuid(&group_id), deleted_by = %abbrev_uuid(&admin.id), "Group deleted");
    Ok(Json(MessageResponse::new("Group deleted successfully")))
}
