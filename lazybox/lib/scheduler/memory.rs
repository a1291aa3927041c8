use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{LazyboxError, LazyboxResult};

use super::{ActionScheduler, Schedule, SchedulePatch, ScheduleSpec, ScheduleState};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An in-process [`ActionScheduler`].
#[derive(Debug, Clone, Default)]
pub struct MemoryScheduler {
    schedules: Arc<RwLock<HashMap<String, Schedule>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemoryScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all schedules.
    pub async fn all(&self) -> Vec<Schedule> {
        self.schedules.read().await.values().cloned().collect()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ActionScheduler for MemoryScheduler {
    async fn create(&self, spec: &ScheduleSpec) -> LazyboxResult<Schedule> {
        let mut schedules = self.schedules.write().await;
        if schedules.contains_key(&spec.name) {
            return Err(LazyboxError::Conflict(format!(
                "schedule {} already exists",
                spec.name
            )));
        }

        let schedule = Schedule {
            name: spec.name.clone(),
            reference: format!("schedule/{}", spec.name),
            fire_at: spec.fire_at,
            state: ScheduleState::Enabled,
            payload: spec.payload.clone(),
            fired_at: None,
        };

        schedules.insert(spec.name.clone(), schedule.clone());
        Ok(schedule)
    }

    async fn get(&self, name: &str) -> LazyboxResult<Option<Schedule>> {
        Ok(self.schedules.read().await.get(name).cloned())
    }

    async fn update(&self, name: &str, patch: &SchedulePatch) -> LazyboxResult<Schedule> {
        let mut schedules = self.schedules.write().await;
        let schedule = schedules
            .get_mut(name)
            .ok_or_else(|| LazyboxError::ScheduleNotFound(name.to_string()))?;

        *schedule = schedule.merged(patch);
        Ok(schedule.clone())
    }

    async fn take_due(&self, now: DateTime<Utc>) -> LazyboxResult<Vec<Schedule>> {
        let mut schedules = self.schedules.write().await;
        let mut due = Vec::new();
        for schedule in schedules.values_mut() {
            if schedule.is_due(now) {
                schedule.fired_at = Some(now);
                due.push(schedule.clone());
            }
        }

        due.sort_by_key(|schedule| schedule.fire_at);
        Ok(due)
    }

    async fn release(&self, name: &str) -> LazyboxResult<()> {
        if let Some(schedule) = self.schedules.write().await.get_mut(name) {
            schedule.fired_at = None;
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
