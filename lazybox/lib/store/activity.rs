use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::{LazyboxError, LazyboxResult};

use super::{db::encode_time, ActivityEvent, ActivityLog};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An [`ActivityLog`] backed by the lazybox SQLite database.
///
/// Events are keyed by their millisecond timestamp so window queries use the
/// `(sandbox_uuid, timestamp_ms)` index.
#[derive(Debug, Clone)]
pub struct SqliteActivityLog {
    pool: Pool<Sqlite>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SqliteActivityLog {
    /// Creates a new activity log over an already migrated pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ActivityLog for SqliteActivityLog {
    async fn open_stream(&self, uuid: &Uuid) -> LazyboxResult<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_streams (sandbox_uuid, created_at)
            VALUES (?, ?)
            ON CONFLICT (sandbox_uuid) DO NOTHING
            "#,
        )
        .bind(uuid.to_string())
        .bind(encode_time(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append(&self, uuid: &Uuid, event: &ActivityEvent) -> LazyboxResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO activity_events (sandbox_uuid, timestamp_ms, message)
            SELECT ?, ?, ?
            WHERE EXISTS (SELECT 1 FROM activity_streams WHERE sandbox_uuid = ?)
            "#,
        )
        .bind(uuid.to_string())
        .bind(event.timestamp.timestamp_millis())
        .bind(&event.message)
        .bind(uuid.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LazyboxError::SandboxNotFound(format!(
                "no activity stream for {uuid}"
            )));
        }

        Ok(())
    }

    async fn has_activity(
        &self,
        uuid: &Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LazyboxResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM activity_events
            WHERE sandbox_uuid = ? AND timestamp_ms >= ? AND timestamp_ms <= ?
            LIMIT 1
            "#,
        )
        .bind(uuid.to_string())
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;
    use crate::store;

    #[tokio::test]
    async fn test_sqlite_activity_window() -> LazyboxResult<()> {
        let temp_dir = tempdir()?;
        let pool = store::get_or_create_db_pool(temp_dir.path().join("lazybox.db")).await?;
        let log = SqliteActivityLog::new(pool);

        let uuid = Uuid::new_v4();
        log.open_stream(&uuid).await?;
        log.open_stream(&uuid).await?;

        let now = Utc::now();
        let seen = now - Duration::minutes(3);
        log.append(&uuid, &ActivityEvent::request("7-demo-alice.gh.example.com", seen))
            .await?;

        let window = Duration::minutes(10);
        assert!(log.has_activity(&uuid, now - window, now).await?);
        assert!(log.has_activity(&uuid, seen, seen).await?);
        assert!(!log.has_activity(&uuid, now - Duration::minutes(2), now).await?);
        assert!(!log.has_activity(&Uuid::new_v4(), now - window, now).await?);

        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_activity_append_requires_stream() -> LazyboxResult<()> {
        let temp_dir = tempdir()?;
        let pool = store::get_or_create_db_pool(temp_dir.path().join("lazybox.db")).await?;
        let log = SqliteActivityLog::new(pool);

        let result = log
            .append(&Uuid::new_v4(), &ActivityEvent::request("h", Utc::now()))
            .await;
        assert!(matches!(result, Err(LazyboxError::SandboxNotFound(_))));

        Ok(())
    }
}
