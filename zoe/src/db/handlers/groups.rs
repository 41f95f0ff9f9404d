//! Database repository for groups and memberships.

use crate::db::{
    errors::{DbError, Result},
    handlers::{contains_pattern, repository::Repository},
    models::groups::{
        ContentVisibility, GroupCreateDBRequest, GroupDBResponse, GroupSettings, GroupType, GroupUpdateDBRequest,
        MemberCreateDBRequest, MemberDBResponse, MemberPermissions, MemberRole,
    },
};
use crate::types::{GroupId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

const GROUP_SELECT: &str = "SELECT g.*, (SELECT COUNT(*) FROM group_members m WHERE m.group_id = g.id) AS member_count FROM groups g";

/// Filter for listing groups
#[derive(Debug, Clone)]
pub struct GroupFilter {
    pub skip: i64,
    pub limit: i64,
    pub group_type: Option<GroupType>,
    /// Case-insensitive substring search on name and description
    pub search: Option<String>,
    /// Restrict to public groups plus the groups this user belongs to
    pub visible_to: Option<UserId>,
}

impl GroupFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            group_type: None,
            search: None,
            visible_to: None,
        }
    }

    pub fn with_type(mut self, group_type: GroupType) -> Self {
        self.group_type = Some(group_type);
        self
    }

    pub fn with_search(mut self, search: String) -> Self {
        self.search = Some(search);
        self
    }

    pub fn visible_to(mut self, user_id: UserId) -> Self {
        self.visible_to = Some(user_id);
        self
    }

    fn push_conditions<'a>(&'a self, query: &mut QueryBuilder<'a, Sqlite>) {
        if let Some(group_type) = self.group_type {
            query.push(" AND g.group_type = ");
            query.push_bind(group_type);
        }
        if let Some(ref search) = self.search {
            let search_pattern = contains_pattern(search);
            query.push(" AND (g.name LIKE ");
            query.push_bind(search_pattern.clone());
            query.push(r" ESCAPE '\' OR COALESCE(g.description, '') LIKE ");
            query.push_bind(search_pattern);
            query.push(r" ESCAPE '\')");
        }
        if let Some(user_id) = self.visible_to {
            query.push(" AND (g.group_type = 'public' OR EXISTS (SELECT 1 FROM group_members vm WHERE vm.group_id = g.id AND vm.user_id = ");
            query.push_bind(user_id);
            query.push("))");
        }
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: Option<String>,
    pub group_type: GroupType,
    pub require_approval: bool,
    pub allow_invites: bool,
    pub max_members: i64,
    pub content_visibility: ContentVisibility,
    pub created_by: UserId,
    pub post_count: i64,
    pub member_count: i64,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Group> for GroupDBResponse {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            description: group.description,
            group_type: group.group_type,
            settings: GroupSettings {
                require_approval: group.require_approval,
                allow_invites: group.allow_invites,
                max_members: group.max_members,
                content_visibility: group.content_visibility,
            },
            created_by: group.created_by,
            post_count: group.post_count,
            member_count: group.member_count,
            last_activity: group.last_activity,
            created_at: group.created_at,
            updated_at: group.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct Member {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub username: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub invited_by: Option<UserId>,
    pub post_count: i64,
    pub last_active: DateTime<Utc>,
    pub can_post: bool,
    pub can_comment: bool,
    pub can_invite: bool,
    pub can_remove: bool,
    pub can_manage_settings: bool,
}

impl From<Member> for MemberDBResponse {
    fn from(member: Member) -> Self {
        Self {
            group_id: member.group_id,
            user_id: member.user_id,
            username: member.username,
            role: member.role,
            joined_at: member.joined_at,
            invited_by: member.invited_by,
            post_count: member.post_count,
            last_active: member.last_active,
            permissions: MemberPermissions {
                can_post: member.can_post,
                can_comment: member.can_comment,
                can_invite: member.can_invite,
                can_remove: member.can_remove,
                can_manage_settings: member.can_manage_settings,
            },
        }
    }
}

pub struct Groups<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Groups<'c> {
    type CreateRequest = GroupCreateDBRequest;
    type UpdateRequest = GroupUpdateDBRequest;
    type Response = GroupDBResponse;
    type Id = GroupId;
    type Filter = GroupFilter;

    /// Insert the group row. Memberships, including the creator's, are added separately.
    #[instrument(skip(self, request), fields(group_name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let now = Utc::now();
        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (id, name, description, group_type, require_approval, allow_invites, max_members,
                                content_visibility, created_by, post_count, last_activity, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
            RETURNING *, 0 AS member_count
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.group_type)
        .bind(request.settings.require_approval)
        .bind(request.settings.allow_invites)
        .bind(request.settings.max_members)
        .bind(request.settings.content_visibility)
        .bind(request.created_by)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(GroupDBResponse::from(group))
    }

    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let group = sqlx::query_as::<_, Group>(&format!("{GROUP_SELECT} WHERE g.id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(group.map(GroupDBResponse::from))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<GroupId>) -> Result<HashMap<GroupId, GroupDBResponse>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(GROUP_SELECT);
        query.push(" WHERE g.id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        query.push(")");

        let groups = query.build_query_as::<Group>().fetch_all(&mut *self.db).await?;

        Ok(groups.into_iter().map(|g| (g.id, GroupDBResponse::from(g))).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::<Sqlite>::new(GROUP_SELECT);
        query.push(" WHERE 1=1");
        filter.push_conditions(&mut query);

        query.push(" ORDER BY g.last_activity DESC, g.rowid DESC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        tracing::debug!("Executing SQL: {}", query.sql());

        let groups = query.build_query_as::<Group>().fetch_all(&mut *self.db).await?;

        Ok(groups.into_iter().map(GroupDBResponse::from).collect())
    }

    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = ?")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(group_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE groups SET
                name = COALESCE(?, name),
                description = COALESCE(?, description),
                group_type = COALESCE(?, group_type),
                require_approval = COALESCE(?, require_approval),
                allow_invites = COALESCE(?, allow_invites),
                max_members = COALESCE(?, max_members),
                content_visibility = COALESCE(?, content_visibility),
                last_activity = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.group_type)
        .bind(request.require_approval)
        .bind(request.allow_invites)
        .bind(request.max_members)
        .bind(request.content_visibility)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }
}

impl<'c> Groups<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &GroupFilter) -> Result<i64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM groups g WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self, request), fields(group_id = %abbrev_uuid(&request.group_id), user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn add_member(&mut self, request: &MemberCreateDBRequest) -> Result<MemberDBResponse> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO group_members (group_id, user_id, role, joined_at, invited_by, post_count, last_active,
                                       can_post, can_comment, can_invite, can_remove, can_manage_settings)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request.group_id)
        .bind(request.user_id)
        .bind(request.role)
        .bind(now)
        .bind(request.invited_by)
        .bind(now)
        .bind(request.permissions.can_post)
        .bind(request.permissions.can_comment)
        .bind(request.permissions.can_invite)
        .bind(request.permissions.can_remove)
        .bind(request.permissions.can_manage_settings)
        .execute(&mut *self.db)
        .await?;

        self.get_member(request.group_id, request.user_id)
            .await?
            .ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&group_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_member(&mut self, group_id: GroupId, user_id: UserId) -> Result<Option<MemberDBResponse>> {
        let member = sqlx::query_as::<_, Member>(
            r#"
            SELECT m.*, u.username
            FROM group_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.group_id = ? AND m.user_id = ?
            "#,
        )
        .bind(group_id)
        .bind(user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        Ok(member.map(MemberDBResponse::from))
    }

    /// Members of a group in join order
    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&group_id)), err)]
    pub async fn list_members(&mut self, group_id: GroupId) -> Result<Vec<MemberDBResponse>> {
        let members = sqlx::query_as::<_, Member>(
            r#"
            SELECT m.*, u.username
            FROM group_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.group_id = ?
            ORDER BY m.joined_at ASC, m.rowid ASC
            "#,
        )
        .bind(group_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(members.into_iter().map(MemberDBResponse::from).collect())
    }

    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&group_id), user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn remove_member(&mut self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(group_id)
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&group_id)), err)]
    pub async fn member_count(&mut self, group_id: GroupId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM group_members WHERE group_id = ?")
            .bind(group_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Mark the group as active now
    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&group_id)), err)]
    pub async fn touch_activity(&mut self, group_id: GroupId) -> Result<()> {
        sqlx::query("UPDATE groups SET last_activity = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(group_id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Users;
    use crate::db::models::users::UserCreateDBRequest;
    use crate::types::Role;
    use sqlx::SqlitePool;

    async fn create_user(conn: &mut SqliteConnection, username: &str) -> UserId {
        Users::new(conn)
            .create(&UserCreateDBRequest {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                password_hash: "hash".to_string(),
                role: Role::User,
                max_devices: 3,
            })
            .await
            .unwrap()
            .id
    }

    fn group_request(name: &str, group_type: GroupType, created_by: UserId) -> GroupCreateDBRequest {
        GroupCreateDBRequest {
            name: name.to_string(),
            description: Some(format!("The {name} group")),
            group_type,
            settings: GroupSettings::default(),
            created_by,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_group_and_members(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let owner = create_user(&mut conn, "owner").await;
        let joiner = create_user(&mut conn, "joiner").await;
        let mut repo = Groups::new(&mut conn);

        let group = repo.create(&group_request("Hikers", GroupType::Public, owner)).await.unwrap();
        assert_eq!(group.member_count, 0);
        assert_eq!(group.settings, GroupSettings::default());

        repo.add_member(&MemberCreateDBRequest {
            group_id: group.id,
            user_id: owner,
            role: MemberRole::Admin,
            invited_by: None,
            permissions: MemberPermissions::all(),
        })
        .await
        .unwrap();
        let member = repo
            .add_member(&MemberCreateDBRequest {
                group_id: group.id,
                user_id: joiner,
                role: MemberRole::Member,
                invited_by: Some(owner),
                permissions: MemberPermissions::default(),
            })
            .await
            .unwrap();
        assert_eq!(member.username, "joiner");
        assert_eq!(member.invited_by, Some(owner));
        assert!(!member.permissions.can_invite);

        let fetched = repo.get_by_id(group.id).await.unwrap().unwrap();
        assert_eq!(fetched.member_count, 2);

        let members = repo.list_members(group.id).await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[0].user_id, owner);
        assert_eq!(members[0].role, MemberRole::Admin);
        assert!(members[0].permissions.can_manage_settings);

        assert!(repo.remove_member(group.id, joiner).await.unwrap());
        assert!(!repo.remove_member(group.id, joiner).await.unwrap());
        assert_eq!(repo.member_count(group.id).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_member_and_name(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let owner = create_user(&mut conn, "owner").await;
        let mut repo = Groups::new(&mut conn);

        let group = repo.create(&group_request("Readers", GroupType::Private, owner)).await.unwrap();
        let duplicate = repo.create(&group_request("Readers", GroupType::Public, owner)).await;
        assert!(matches!(
            duplicate,
            Err(DbError::UniqueViolation { ref table, .. }) if table.as_deref() == Some("groups")
        ));

        let membership = MemberCreateDBRequest {
            group_id: group.id,
            user_id: owner,
            role: MemberRole::Admin,
            invited_by: None,
            permissions: MemberPermissions::all(),
        };
        repo.add_member(&membership).await.unwrap();
        let again = repo.add_member(&membership).await;
        assert!(matches!(
            again,
            Err(DbError::UniqueViolation { ref table, .. }) if table.as_deref() == Some("group_members")
        ));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_visibility_filter(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let owner = create_user(&mut conn, "owner").await;
        let outsider = create_user(&mut conn, "outsider").await;
        let mut repo = Groups::new(&mut conn);

        repo.create(&group_request("Open", GroupType::Public, owner)).await.unwrap();
        let private = repo.create(&group_request("Closed", GroupType::Private, owner)).await.unwrap();
        repo.create(&group_request("Hidden", GroupType::Secret, owner)).await.unwrap();
        repo.add_member(&MemberCreateDBRequest {
            group_id: private.id,
            user_id: owner,
            role: MemberRole::Admin,
            invited_by: None,
            permissions: MemberPermissions::all(),
        })
        .await
        .unwrap();

        let all = repo.list(&GroupFilter::new(0, 10)).await.unwrap();
        assert_eq!(all.len(), 3);

        let for_outsider = GroupFilter::new(0, 10).visible_to(outsider);
        let names: Vec<_> = repo
            .list(&for_outsider)
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["Open"]);
        assert_eq!(repo.count(&for_outsider).await.unwrap(), 1);

        let for_owner = GroupFilter::new(0, 10).visible_to(owner);
        assert_eq!(repo.count(&for_owner).await.unwrap(), 2);

        let secret_only = GroupFilter::new(0, 10).with_type(GroupType::Secret);
        assert_eq!(repo.count(&secret_only).await.unwrap(), 1);

        let searched = GroupFilter::new(0, 10).with_search("the closed".to_string());
        let found = repo.list(&searched).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, private.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_and_delete(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let owner = create_user(&mut conn, "owner").await;
        let mut repo = Groups::new(&mut conn);

        let group = repo.create(&group_request("Editable", GroupType::Private, owner)).await.unwrap();
        let updated = repo
            .update(
                group.id,
                &GroupUpdateDBRequest {
                    group_type: Some(GroupType::Public),
                    max_members: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Editable");
        assert_eq!(updated.group_type, GroupType::Public);
        assert_eq!(updated.settings.max_members, 10);
        assert!(updated.settings.require_approval);

        assert!(repo.delete(group.id).await.unwrap());
        assert!(repo.get_by_id(group.id).await.unwrap().is_none());
        assert!(matches!(
            repo.update(group.id, &GroupUpdateDBRequest::default()).await,
            Err(DbError::NotFound)
        ));
    }
}
