use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    models::{SandboxRecord, SandboxUpdate},
    LazyboxError, LazyboxResult,
};

use super::{ActivityEvent, ActivityLog, SandboxStore};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An in-process [`SandboxStore`].
///
/// Used by tests and by `serve --ephemeral`, where nothing should outlive the process.
#[derive(Debug, Clone, Default)]
pub struct MemorySandboxStore {
    records: Arc<RwLock<HashMap<Uuid, SandboxRecord>>>,
}

/// An in-process [`ActivityLog`].
#[derive(Debug, Clone, Default)]
pub struct MemoryActivityLog {
    streams: Arc<RwLock<HashMap<Uuid, Vec<ActivityEvent>>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemorySandboxStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryActivityLog {
    /// Creates an empty activity log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the events recorded for a sandbox, oldest first.
    pub async fn events(&self, uuid: &Uuid) -> Vec<ActivityEvent> {
        self.streams
            .read()
            .await
            .get(uuid)
            .cloned()
            .unwrap_or_default()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl SandboxStore for MemorySandboxStore {
    async fn insert(&self, record: &SandboxRecord) -> LazyboxResult<()> {
        let mut records = self.records.write().await;
        let domains: HashSet<&str> = records.values().map(|r| r.domain.as_str()).collect();
        if records.contains_key(&record.uuid) || domains.contains(record.domain.as_str()) {
            return Err(LazyboxError::Conflict(format!(
                "sandbox {} or domain {} already exists",
                record.uuid, record.domain
            )));
        }

        records.insert(record.uuid, record.clone());
        Ok(())
    }

    async fn get(&self, uuid: &Uuid) -> LazyboxResult<Option<SandboxRecord>> {
        Ok(self.records.read().await.get(uuid).cloned())
    }

    async fn find_by_domain(&self, domain: &str) -> LazyboxResult<Option<SandboxRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|record| record.domain == domain)
            .cloned())
    }

    async fn update(&self, uuid: &Uuid, update: &SandboxUpdate) -> LazyboxResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(uuid)
            .ok_or_else(|| LazyboxError::SandboxNotFound(uuid.to_string()))?;

        record.apply(update);
        Ok(())
    }

    async fn list(&self) -> LazyboxResult<Vec<SandboxRecord>> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}

#[async_trait]
impl ActivityLog for MemoryActivityLog {
    async fn open_stream(&self, uuid: &Uuid) -> LazyboxResult<()> {
        self.streams.write().await.entry(*uuid).or_default();
        Ok(())
    }

    async fn append(&self, uuid: &Uuid, event: &ActivityEvent) -> LazyboxResult<()> {
        let mut streams = self.streams.write().await;
        let stream = streams.get_mut(uuid).ok_or_else(|| {
            LazyboxError::SandboxNotFound(format!("no activity stream for {uuid}"))
        })?;

        stream.push(event.clone());
        Ok(())
    }

    async fn has_activity(
        &self,
        uuid: &Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LazyboxResult<bool> {
        // Compare at millisecond precision, as the SQLite log stores it.
        let (from, to) = (from.timestamp_millis(), to.timestamp_millis());
        Ok(self.streams.read().await.get(uuid).is_some_and(|events| {
            events.iter().any(|event| {
                let ts = event.timestamp.timestamp_millis();
                ts >= from && ts <= to
            })
        }))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
