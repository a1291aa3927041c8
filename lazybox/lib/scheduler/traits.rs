use std::{fmt, str::FromStr};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{LazyboxError, LazyboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Whether a schedule may fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleState {
    /// The schedule fires at its fire time.
    Enabled,

    /// The schedule is kept for reuse but never fires.
    Disabled,
}

/// A named one-shot action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// The unique name, `<prefix>-<uuid>` for idle-checks.
    pub name: String,

    /// The opaque reference stored on the sandbox record.
    pub reference: String,

    /// When the action fires.
    pub fire_at: DateTime<Utc>,

    /// Whether the action may fire.
    pub state: ScheduleState,

    /// The payload handed to the action.
    pub payload: serde_json::Value,

    /// When the action last fired for the current fire time.
    pub fired_at: Option<DateTime<Utc>>,
}

/// The fields of a schedule to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    /// The unique name.
    pub name: String,

    /// When the action fires.
    pub fire_at: DateTime<Utc>,

    /// The payload handed to the action.
    pub payload: serde_json::Value,
}

/// A partial update of a schedule. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulePatch {
    /// A new fire time.
    pub fire_at: Option<DateTime<Utc>>,

    /// A new state.
    pub state: Option<ScheduleState>,

    /// A new payload.
    pub payload: Option<serde_json::Value>,
}

/// The payload of an idle-check schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleCheckPayload {
    /// The sandbox to check.
    pub service_uuid: Uuid,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Fires named, reschedulable actions at a specified time.
#[async_trait]
pub trait ActionScheduler: Send + Sync {
    /// Creates a schedule in the enabled state.
    ///
    /// Fails with `Conflict` if a schedule with the same name exists.
    async fn create(&self, spec: &ScheduleSpec) -> LazyboxResult<Schedule>;

    /// Gets a schedule by name.
    async fn get(&self, name: &str) -> LazyboxResult<Option<Schedule>>;

    /// Merges `patch` into the stored schedule.
    ///
    /// Moving the fire time or enabling the schedule arms it to fire again. Fails with
    /// `ScheduleNotFound` if no schedule has this name.
    async fn update(&self, name: &str, patch: &SchedulePatch) -> LazyboxResult<Schedule>;

    /// Returns the enabled schedules due at `now` that have not fired yet, marking them fired.
    async fn take_due(&self, now: DateTime<Utc>) -> LazyboxResult<Vec<Schedule>>;

    /// Clears the fired mark of a schedule taken by [`take_due`](Self::take_due) whose action
    /// could not be handed off, so the next poll takes it again.
    ///
    /// Releasing an unknown schedule is a no-op.
    async fn release(&self, name: &str) -> LazyboxResult<()>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ScheduleState {
    /// Returns the stored form of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleState::Enabled => "ENABLED",
            ScheduleState::Disabled => "DISABLED",
        }
    }
}

impl Schedule {
    /// Returns a copy with `patch` merged in.
    pub fn merged(&self, patch: &SchedulePatch) -> Self {
        let mut schedule = self.clone();
        if let Some(fire_at) = patch.fire_at {
            schedule.fire_at = fire_at;
            schedule.fired_at = None;
        }

        if let Some(state) = patch.state {
            if state == ScheduleState::Enabled && schedule.state != ScheduleState::Enabled {
                schedule.fired_at = None;
            }
            schedule.state = state;
        }

        if let Some(payload) = &patch.payload {
            schedule.payload = payload.clone();
        }

        schedule
    }

    /// Returns `true` if the schedule should fire at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.state == ScheduleState::Enabled && self.fired_at.is_none() && self.fire_at <= now
    }
}

impl SchedulePatch {
    /// A patch that moves the fire time and enables the schedule.
    pub fn rearm(fire_at: DateTime<Utc>) -> Self {
        Self {
            fire_at: Some(fire_at),
            state: Some(ScheduleState::Enabled),
            payload: None,
        }
    }

    /// A patch that disables the schedule.
    pub fn disable() -> Self {
        Self {
            state: Some(ScheduleState::Disabled),
            ..Default::default()
        }
    }
}

impl IdleCheckPayload {
    /// Encodes the payload for a [`ScheduleSpec`].
    pub fn to_value(&self) -> LazyboxResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decodes the payload of a fired schedule.
    pub fn from_value(value: &serde_json::Value) -> LazyboxResult<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the idle-check schedule name of a sandbox.
pub fn idle_check_schedule_name(prefix: &str, uuid: &Uuid) -> String {
    format!("{prefix}-{uuid}")
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScheduleState {
    type Err = LazyboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENABLED" => Ok(ScheduleState::Enabled),
            "DISABLED" => Ok(ScheduleState::Disabled),
            _ => Err(LazyboxError::custom(anyhow::anyhow!(
                "invalid schedule state: {s}"
            ))),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
