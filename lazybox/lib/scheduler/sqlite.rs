use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Pool, Row, Sqlite};

use crate::{
    store::{decode_time, encode_time, is_unique_violation},
    LazyboxError, LazyboxResult,
};

use super::{ActionScheduler, Schedule, SchedulePatch, ScheduleSpec, ScheduleState};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const SCHEDULE_COLUMNS: &str = "name, reference, fire_at, state, payload, fired_at";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An [`ActionScheduler`] persisting schedules in the lazybox SQLite database.
///
/// Nothing fires on its own. A [`ScheduleRunner`](super::ScheduleRunner) polls
/// [`take_due`](ActionScheduler::take_due), so schedules survive restarts and fire late rather
/// than never.
#[derive(Debug, Clone)]
pub struct SqliteScheduler {
    pool: Pool<Sqlite>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SqliteScheduler {
    /// Creates a scheduler over an already migrated pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ActionScheduler for SqliteScheduler {
    async fn create(&self, spec: &ScheduleSpec) -> LazyboxResult<Schedule> {
        let schedule = Schedule {
            name: spec.name.clone(),
            reference: format!("schedule/{}", spec.name),
            fire_at: spec.fire_at,
            state: ScheduleState::Enabled,
            payload: spec.payload.clone(),
            fired_at: None,
        };

        let now = encode_time(&Utc::now());
        let result = sqlx::query(
            r#"
            INSERT INTO schedules
                (name, reference, fire_at, state, payload, fired_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&schedule.name)
        .bind(&schedule.reference)
        .bind(encode_time(&schedule.fire_at))
        .bind(schedule.state.as_str())
        .bind(serde_json::to_string(&schedule.payload)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(schedule),
            Err(e) if is_unique_violation(&e) => Err(LazyboxError::Conflict(format!(
                "schedule {} already exists",
                spec.name
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, name: &str) -> LazyboxResult<Option<Schedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode_schedule).transpose()
    }

    async fn update(&self, name: &str, patch: &SchedulePatch) -> LazyboxResult<Schedule> {
        // One statement, so concurrent patches serialize on the write lock instead of racing a
        // read against a write. The right-hand sides all see the row as it was.
        let fire_at = patch.fire_at.as_ref().map(encode_time);
        let state = patch.state.map(|state| state.as_str());
        let payload = patch
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE schedules
            SET fired_at = CASE
                    WHEN ? IS NOT NULL THEN NULL
                    WHEN ? = 'ENABLED' AND state <> 'ENABLED' THEN NULL
                    ELSE fired_at
                END,
                fire_at = COALESCE(?, fire_at),
                state = COALESCE(?, state),
                payload = COALESCE(?, payload),
                updated_at = ?
            WHERE name = ?
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(fire_at.clone())
        .bind(state)
        .bind(fire_at)
        .bind(state)
        .bind(payload)
        .bind(encode_time(&Utc::now()))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => decode_schedule(&row),
            None => Err(LazyboxError::ScheduleNotFound(name.to_string())),
        }
    }

    async fn release(&self, name: &str) -> LazyboxResult<()> {
        sqlx::query(
            r#"
            UPDATE schedules
            SET fired_at = NULL, updated_at = ?
            WHERE name = ?
            "#,
        )
        .bind(encode_time(&Utc::now()))
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take_due(&self, now: DateTime<Utc>) -> LazyboxResult<Vec<Schedule>> {
        let now = encode_time(&now);
        let rows = sqlx::query(&format!(
            r#"
            UPDATE schedules
            SET fired_at = ?, updated_at = ?
            WHERE state = 'ENABLED' AND fired_at IS NULL AND fire_at <= ?
            RETURNING {SCHEDULE_COLUMNS}
            "#
        ))
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .fetch_all(&self.pool)
        .await?;

        let mut due = rows
            .iter()
            .map(decode_schedule)
            .collect::<LazyboxResult<Vec<_>>>()?;
        due.sort_by_key(|schedule| schedule.fire_at);

        Ok(due)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn decode_schedule(row: &SqliteRow) -> LazyboxResult<Schedule> {
    let fire_at: String = row.try_get("fire_at")?;
    let state: String = row.try_get("state")?;
    let payload: String = row.try_get("payload")?;
    let fired_at: Option<String> = row.try_get("fired_at")?;

    Ok(Schedule {
        name: row.try_get("name")?,
        reference: row.try_get("reference")?,
        fire_at: decode_time(&fire_at)?,
        state: state.parse()?,
        payload: serde_json::from_str(&payload)?,
        fired_at: fired_at.as_deref().map(decode_time).transpose()?,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::store;

    async fn setup() -> LazyboxResult<(tempfile::TempDir, SqliteScheduler)> {
        let temp_dir = tempdir()?;
        let pool = store::get_or_create_db_pool(temp_dir.path().join("lazybox.db")).await?;
        Ok((temp_dir, SqliteScheduler::new(pool)))
    }

    fn spec(name: &str, fire_at: DateTime<Utc>) -> ScheduleSpec {
        ScheduleSpec {
            name: name.to_string(),
            fire_at,
            payload: json!({ "service_uuid": name }),
        }
    }

    #[tokio::test]
    async fn test_sqlite_scheduler_create_get_update() -> LazyboxResult<()> {
        let (_temp_dir, scheduler) = setup().await?;
        let now = Utc::now();

        let created = scheduler.create(&spec("lazybox-a", now)).await?;
        assert_eq!(created.state, ScheduleState::Enabled);
        assert_eq!(scheduler.get("lazybox-a").await?, Some(created.clone()));

        let conflict = scheduler.create(&spec("lazybox-a", now)).await;
        assert!(matches!(conflict, Err(LazyboxError::Conflict(_))));

        let disabled = scheduler
            .update("lazybox-a", &SchedulePatch::disable())
            .await?;
        assert_eq!(disabled.state, ScheduleState::Disabled);
        assert_eq!(disabled.fire_at, now);
        assert_eq!(disabled.payload, created.payload);

        let missing = scheduler
            .update("lazybox-missing", &SchedulePatch::disable())
            .await;
        assert!(matches!(missing, Err(LazyboxError::ScheduleNotFound(_))));

        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_scheduler_take_due_fires_once() -> LazyboxResult<()> {
        let (_temp_dir, scheduler) = setup().await?;
        let now = Utc::now();

        scheduler
            .create(&spec("lazybox-due", now - Duration::seconds(1)))
            .await?;
        scheduler
            .create(&spec("lazybox-later", now + Duration::minutes(10)))
            .await?;
        scheduler
            .create(&spec("lazybox-off", now - Duration::seconds(1)))
            .await?;
        scheduler
            .update("lazybox-off", &SchedulePatch::disable())
            .await?;

        let due = scheduler.take_due(now).await?;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "lazybox-due");
        assert!(scheduler.take_due(now).await?.is_empty());

        // Rearming lets it fire again.
        scheduler
            .update("lazybox-due", &SchedulePatch::rearm(now))
            .await?;
        assert_eq!(scheduler.take_due(now).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_scheduler_release_lets_schedule_fire_again() -> LazyboxResult<()> {
        let (_temp_dir, scheduler) = setup().await?;
        let now = Utc::now();
        scheduler.create(&spec("lazybox-held", now)).await?;

        assert_eq!(scheduler.take_due(now).await?.len(), 1);
        scheduler.release("lazybox-held").await?;

        let due = scheduler.take_due(now).await?;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].fire_at, now);

        Ok(())
    }

    #[tokio::test]
    async fn test_sqlite_scheduler_concurrent_updates_all_succeed() -> LazyboxResult<()> {
        let (_temp_dir, scheduler) = setup().await?;
        let now = Utc::now();
        scheduler.create(&spec("lazybox-busy", now)).await?;

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let scheduler = scheduler.clone();
            tasks.spawn(async move {
                let patch = if i % 2 == 0 {
                    SchedulePatch::rearm(now + Duration::minutes(i))
                } else {
                    SchedulePatch::disable()
                };
                scheduler.update("lazybox-busy", &patch).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            result.map_err(LazyboxError::custom)??;
        }

        let schedule = scheduler.get("lazybox-busy").await?.expect("schedule");
        assert_eq!(schedule.payload, json!({ "service_uuid": "lazybox-busy" }));
        Ok(())
    }
}
