use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Pool, QueryBuilder, Row, Sqlite};
use uuid::Uuid;

use crate::{
    models::{SandboxRecord, SandboxUpdate},
    LazyboxError, LazyboxResult,
};

use super::{
    db::{decode_time, encode_time, is_unique_violation},
    SandboxStore,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const SANDBOX_COLUMNS: &str = r#"
    uuid, created_by_user_id, pr, repository, user, task_status, domain, registry,
    created_at, updated_at, task_definition_ref, registry_ref, service_ref, desired_tasks,
    shutdown_schedule_ref, next_shutdown_at
"#;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`SandboxStore`] backed by the lazybox SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteSandboxStore {
    pool: Pool<Sqlite>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SqliteSandboxStore {
    /// Creates a new store over an already migrated pool.
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl SandboxStore for SqliteSandboxStore {
    async fn insert(&self, record: &SandboxRecord) -> LazyboxResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO sandboxes (
                uuid, created_by_user_id, pr, repository, user, task_status, domain, registry,
                created_at, updated_at, task_definition_ref, registry_ref, service_ref,
                desired_tasks, shutdown_schedule_ref, next_shutdown_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.uuid.to_string())
        .bind(record.created_by_user_id as i64)
        .bind(record.pr as i64)
        .bind(&record.repository)
        .bind(&record.user)
        .bind(record.status.as_str())
        .bind(&record.domain)
        .bind(&record.registry)
        .bind(encode_time(&record.created_at))
        .bind(encode_time(&record.updated_at))
        .bind(&record.template_ref)
        .bind(&record.registry_ref)
        .bind(&record.service_ref)
        .bind(record.desired_tasks.map(i64::from))
        .bind(&record.schedule_ref)
        .bind(record.next_shutdown_at.as_ref().map(encode_time))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(LazyboxError::Conflict(format!(
                "sandbox {} or domain {} already exists",
                record.uuid, record.domain
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, uuid: &Uuid) -> LazyboxResult<Option<SandboxRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SANDBOX_COLUMNS} FROM sandboxes WHERE uuid = ?"
        ))
        .bind(uuid.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode_record).transpose()
    }

    async fn find_by_domain(&self, domain: &str) -> LazyboxResult<Option<SandboxRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SANDBOX_COLUMNS} FROM sandboxes WHERE domain = ?"
        ))
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode_record).transpose()
    }

    async fn update(&self, uuid: &Uuid, update: &SandboxUpdate) -> LazyboxResult<()> {
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE sandboxes SET updated_at = ");
        query.push_bind(encode_time(&update.updated_at));

        if let Some(status) = update.status {
            query.push(", task_status = ").push_bind(status.as_str());
        }

        if let Some(template_ref) = &update.template_ref {
            query
                .push(", task_definition_ref = ")
                .push_bind(template_ref.clone());
        }

        if let Some(registry_ref) = &update.registry_ref {
            query.push(", registry_ref = ").push_bind(registry_ref.clone());
        }

        if let Some(service_ref) = &update.service_ref {
            query.push(", service_ref = ").push_bind(service_ref.clone());
        }

        if let Some(desired_tasks) = update.desired_tasks {
            query
                .push(", desired_tasks = ")
                .push_bind(i64::from(desired_tasks));
        }

        if let Some(schedule_ref) = &update.schedule_ref {
            query
                .push(", shutdown_schedule_ref = ")
                .push_bind(schedule_ref.clone());
        }

        if let Some(next_shutdown_at) = &update.next_shutdown_at {
            query
                .push(", next_shutdown_at = ")
                .push_bind(next_shutdown_at.as_ref().map(encode_time));
        }

        query.push(" WHERE uuid = ").push_bind(uuid.to_string());

        let result = query.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(LazyboxError::SandboxNotFound(uuid.to_string()));
        }

        Ok(())
    }

    async fn list(&self) -> LazyboxResult<Vec<SandboxRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {SANDBOX_COLUMNS} FROM sandboxes ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_record).collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Decodes a `sandboxes` row into a typed record.
fn decode_record(row: &SqliteRow) -> LazyboxResult<SandboxRecord> {
    let uuid: String = row.try_get("uuid")?;
    let status: String = row.try_get("task_status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let desired_tasks: Option<i64> = row.try_get("desired_tasks")?;
    let next_shutdown_at: Option<String> = row.try_get("next_shutdown_at")?;

    Ok(SandboxRecord {
        uuid: Uuid::parse_str(&uuid).map_err(LazyboxError::custom)?,
        created_by_user_id: row.try_get::<i64, _>("created_by_user_id")? as u64,
        pr: row.try_get::<i64, _>("pr")? as u64,
        repository: row.try_get("repository")?,
        user: row.try_get("user")?,
        status: status.parse()?,
        domain: row.try_get("domain")?,
        registry: row.try_get("registry")?,
        created_at: decode_time(&created_at)?,
        updated_at: decode_time(&updated_at)?,
        template_ref: row.try_get("task_definition_ref")?,
        registry_ref: row.try_get("registry_ref")?,
        service_ref: row.try_get("service_ref")?,
        desired_tasks: desired_tasks.map(|count| count as u8),
        schedule_ref: row.try_get("shutdown_schedule_ref")?,
        next_shutdown_at: next_shutdown_at.as_deref().map(decode_time).transpose()?,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
