//! Database repository for the login audit trail.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::login_logs::{LoginLogCreateDBRequest, LoginLogDBResponse, LoginLogUpdateDBRequest},
};
use crate::types::{LoginLogId, UserId, abbrev_uuid};
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing login logs
#[derive(Debug, Clone)]
pub struct LoginLogFilter {
    pub skip: i64,
    pub limit: i64,
    pub user_id: Option<UserId>,
}

impl LoginLogFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            user_id: None,
        }
    }

    pub fn for_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    fn push_conditions<'a>(&'a self, query: &mut QueryBuilder<'a, Sqlite>) {
        if let Some(user_id) = self.user_id {
            query.push(" AND user_id = ");
            query.push_bind(user_id);
        }
    }
}

pub struct LoginLogs<'c> {
    db: &'c mut SqliteConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for LoginLogs<'c> {
    type CreateRequest = LoginLogCreateDBRequest;
    type UpdateRequest = LoginLogUpdateDBRequest;
    type Response = LoginLogDBResponse;
    type Id = LoginLogId;
    type Filter = LoginLogFilter;

    #[instrument(skip(self, request), fields(status = ?request.status), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let log = sqlx::query_as::<_, LoginLogDBResponse>(
            r#"
            INSERT INTO login_logs (id, user_id, login_time, device_id, ip_address, user_agent, browser, os,
                                    status, failure_reason, is_suspicious)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(Utc::now())
        .bind(&request.device_id)
        .bind(&request.ip_address)
        .bind(&request.user_agent)
        .bind(&request.browser)
        .bind(&request.os)
        .bind(request.status)
        .bind(request.failure_reason)
        .bind(request.is_suspicious)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(log)
    }

    #[instrument(skip(self), fields(login_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let log = sqlx::query_as::<_, LoginLogDBResponse>("SELECT * FROM login_logs WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(log)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<LoginLogId>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM login_logs WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &ids {
            separated.push_bind(*id);
        }
        query.push(")");

        let logs = query
            .build_query_as::<LoginLogDBResponse>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(logs.into_iter().map(|l| (l.id, l)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM login_logs WHERE 1=1");
        filter.push_conditions(&mut query);

        query.push(" ORDER BY login_time DESC, rowid DESC LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let logs = query
            .build_query_as::<LoginLogDBResponse>()
            .fetch_all(&mut *self.db)
            .await?;

        Ok(logs)
    }

    #[instrument(skip(self), fields(login_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM login_logs WHERE id = ?")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(login_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let log = sqlx::query_as::<_, LoginLogDBResponse>(
            "UPDATE login_logs SET logout_time = ?, session_duration = ? WHERE id = ? RETURNING *",
        )
        .bind(request.logout_time)
        .bind(request.session_duration)
        .bind(id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(log)
    }
}

impl<'c> LoginLogs<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &LoginLogFilter) -> Result<i64> {
        let mut query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM login_logs WHERE 1=1");
        filter.push_conditions(&mut query);

        let count: i64 = query.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    /// The most recent `limit` attempts for a user, newest first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn recent_for_user(&mut self, user_id: UserId, limit: i64) -> Result<Vec<LoginLogDBResponse>> {
        self.list(&LoginLogFilter::new(0, limit).for_user(user_id)).await
    }

    /// Close a session: stamp the logout time and compute the session length in seconds.
    ///
    /// Returns `None` when the log entry does not exist.
    #[instrument(skip(self), fields(login_id = %abbrev_uuid(&id)), err)]
    pub async fn close(&mut self, id: LoginLogId) -> Result<Option<LoginLogDBResponse>> {
        let Some(log) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let logout_time = Utc::now();
        let session_duration = (logout_time - log.login_time).num_seconds().max(0);

        let closed = self
            .update(
                id,
                &LoginLogUpdateDBRequest {
                    logout_time,
                    session_duration,
                },
            )
            .await?;

        Ok(Some(closed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Users;
    use crate::db::models::login_logs::{FailureReason, LoginStatus};
    use crate::db::models::users::UserCreateDBRequest;
    use crate::types::Role;
    use sqlx::SqlitePool;

    async fn create_user(conn: &mut SqliteConnection) -> UserId {
        Users::new(conn)
            .create(&UserCreateDBRequest {
                username: "audited".to_string(),
                email: "audited@example.com".to_string(),
                password_hash: "hash".to_string(),
                role: Role::User,
                max_devices: 3,
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_success_and_failure_logs(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn).await;
        let mut repo = LoginLogs::new(&mut conn);

        let ok = repo
            .create(
                &LoginLogCreateDBRequest::success(user_id, "10.0.0.1")
                    .with_user_agent(Some("Mozilla/5.0 (Windows NT 10.0) Chrome/120.0".to_string()))
                    .with_device_id("abc"),
            )
            .await
            .unwrap();
        assert_eq!(ok.status, LoginStatus::Success);
        assert_eq!(ok.browser.as_deref(), Some("Chrome"));
        assert_eq!(ok.os.as_deref(), Some("Windows"));
        assert_eq!(ok.device_id.as_deref(), Some("abc"));
        assert!(!ok.is_suspicious);

        let anonymous = repo
            .create(&LoginLogCreateDBRequest::rejected(
                None,
                "10.0.0.2",
                LoginStatus::Failed,
                FailureReason::InvalidApiKey,
            ))
            .await
            .unwrap();
        assert!(anonymous.user_id.is_none());
        assert!(anonymous.is_suspicious);
        assert_eq!(anonymous.failure_reason, Some(FailureReason::InvalidApiKey));

        let blocked = repo
            .create(&LoginLogCreateDBRequest::rejected(
                Some(user_id),
                "10.0.0.1",
                LoginStatus::Blocked,
                FailureReason::DeviceNotTrusted,
            ))
            .await
            .unwrap();
        assert!(!blocked.is_suspicious);

        assert_eq!(repo.count(&LoginLogFilter::new(0, 10)).await.unwrap(), 3);
        assert_eq!(repo.count(&LoginLogFilter::new(0, 10).for_user(user_id)).await.unwrap(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_recent_for_user_is_newest_first(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn).await;
        let mut repo = LoginLogs::new(&mut conn);

        let mut ids = Vec::new();
        for i in 0..7 {
            let log = repo
                .create(&LoginLogCreateDBRequest::success(user_id, format!("10.0.0.{i}")))
                .await
                .unwrap();
            ids.push(log.id);
        }

        let recent = repo.recent_for_user(user_id, 5).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].id, ids[6]);
        assert_eq!(recent[4].id, ids[2]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_close_session(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn).await;
        let mut repo = LoginLogs::new(&mut conn);

        let log = repo
            .create(&LoginLogCreateDBRequest::success(user_id, "10.0.0.1"))
            .await
            .unwrap();
        let closed = repo.close(log.id).await.unwrap().unwrap();
        assert!(closed.logout_time.is_some());
        assert!(closed.session_duration.unwrap() >= 0);

        assert!(repo.close(Uuid::new_v4()).await.unwrap().is_none());
    }
}
