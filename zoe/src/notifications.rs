//! Expired notification sweeper.
//!
//! Deletes notifications whose `expires_at` has passed, once per `sweep_interval`, until the
//! shutdown token is cancelled. Expired rows are already hidden from inboxes, so the sweep only
//! reclaims space.

use chrono::Utc;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::NotificationsConfig;
use crate::db::{errors::DbError, handlers::Notifications};
use crate::errors::Error;

pub async fn run_expiry_sweeper(config: NotificationsConfig, pool: SqlitePool, shutdown: CancellationToken) {
    tracing::info!(sweep_interval = ?config.sweep_interval, "Starting notification expiry sweeper");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(config.sweep_interval) => {}
            _ = shutdown.cancelled() => {
                tracing::info!("Notification expiry sweeper shutting down");
                return;
            }
        }

        match sweep_expired(&pool).await {
            Ok(0) => tracing::trace!("No expired notifications"),
            Ok(removed) => tracing::info!(removed, "Removed expired notifications"),
            Err(e) => tracing::warn!(error = %e, "Failed to sweep expired notifications"),
        }
    }
}

/// Delete every expired notification, returning how many were removed
pub async fn sweep_expired(pool: &SqlitePool) -> Result<u64, Error> {
    let mut conn = pool.acquire().await.map_err(DbError::from)?;
    let removed = Notifications::new(&mut conn).delete_expired(Utc::now()).await?;
    Ok(removed)
}
