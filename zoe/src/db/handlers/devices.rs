//! Database repository for the devices a user has logged in from.

use crate::db::{
    errors::Result,
    models::devices::{DeviceCreateDBRequest, DeviceDBResponse},
};
use crate::types::{UserId, abbrev_uuid};
use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::instrument;
use uuid::Uuid;

pub struct Devices<'c> {
    db: &'c mut SqliteConnection,
}

impl<'c> Devices<'c> {
    pub fn new(db: &'c mut SqliteConnection) -> Self {
        Self { db }
    }

    /// Devices registered to a user, oldest registration first
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn list_for_user(&mut self, user_id: UserId) -> Result<Vec<DeviceDBResponse>> {
        let devices = sqlx::query_as::<_, DeviceDBResponse>(
            "SELECT * FROM user_devices WHERE user_id = ? ORDER BY registered_at ASC, rowid ASC",
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        Ok(devices)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn count_for_user(&mut self, user_id: UserId) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_devices WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    #[instrument(skip(self, device_id), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn find(&mut self, user_id: UserId, device_id: &str) -> Result<Option<DeviceDBResponse>> {
        let device =
            sqlx::query_as::<_, DeviceDBResponse>("SELECT * FROM user_devices WHERE user_id = ? AND device_id = ?")
                .bind(user_id)
                .bind(device_id)
                .fetch_optional(&mut *self.db)
                .await?;

        Ok(device)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn register(&mut self, request: &DeviceCreateDBRequest) -> Result<DeviceDBResponse> {
        let now = Utc::now();
        let device = sqlx::query_as::<_, DeviceDBResponse>(
            r#"
            INSERT INTO user_devices (id, user_id, device_id, user_agent, ip_address, browser, os, is_trusted, last_used, registered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.device_id)
        .bind(&request.user_agent)
        .bind(&request.ip_address)
        .bind(&request.browser)
        .bind(&request.os)
        .bind(request.is_trusted)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(device)
    }

    /// Refresh `last_used` on a device the user has logged in from before
    #[instrument(skip(self, device_id), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn touch(&mut self, user_id: UserId, device_id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE user_devices SET last_used = ? WHERE user_id = ? AND device_id = ?")
            .bind(Utc::now())
            .bind(user_id)
            .bind(device_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, device_id), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn remove(&mut self, user_id: UserId, device_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM user_devices WHERE user_id = ? AND device_id = ?")
            .bind(user_id)
            .bind(device_id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::{Repository, Users};
    use crate::db::models::users::UserCreateDBRequest;
    use crate::types::Role;
    use sqlx::SqlitePool;

    async fn create_user(conn: &mut SqliteConnection) -> UserId {
        Users::new(conn)
            .create(&UserCreateDBRequest {
                username: "deviceowner".to_string(),
                email: "deviceowner@example.com".to_string(),
                password_hash: "hash".to_string(),
                role: Role::User,
                max_devices: 2,
            })
            .await
            .unwrap()
            .id
    }

    fn device(user_id: UserId, device_id: &str) -> DeviceCreateDBRequest {
        DeviceCreateDBRequest {
            user_id,
            device_id: device_id.to_string(),
            user_agent: Some("curl/8.0".to_string()),
            ip_address: Some("127.0.0.1".to_string()),
            browser: Some("Other".to_string()),
            os: Some("Other".to_string()),
            is_trusted: false,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_register_find_and_remove(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn).await;
        let mut repo = Devices::new(&mut conn);

        let registered = repo.register(&device(user_id, "dev-1")).await.unwrap();
        assert!(!registered.is_trusted);
        repo.register(&device(user_id, "dev-2")).await.unwrap();

        assert_eq!(repo.count_for_user(user_id).await.unwrap(), 2);
        let listed = repo.list_for_user(user_id).await.unwrap();
        assert_eq!(listed[0].device_id, "dev-1");
        assert_eq!(listed[1].device_id, "dev-2");

        let found = repo.find(user_id, "dev-1").await.unwrap().unwrap();
        assert_eq!(found.id, registered.id);
        assert!(repo.find(user_id, "dev-3").await.unwrap().is_none());

        assert!(repo.touch(user_id, "dev-1").await.unwrap());
        let touched = repo.find(user_id, "dev-1").await.unwrap().unwrap();
        assert!(touched.last_used >= registered.last_used);

        assert!(repo.remove(user_id, "dev-1").await.unwrap());
        assert!(!repo.remove(user_id, "dev-1").await.unwrap());
        assert_eq!(repo.count_for_user(user_id).await.unwrap(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_same_device_twice_is_rejected(pool: SqlitePool) {
        let mut conn = pool.acquire().await.unwrap();
        let user_id = create_user(&mut conn).await;
        let mut repo = Devices::new(&mut conn);

        repo.register(&device(user_id, "dev-1")).await.unwrap();
        let result = repo.register(&device(user_id, "dev-1")).await;
        assert!(matches!(result, Err(crate::db::errors::DbError::UniqueViolation { .. })));
    }
}
