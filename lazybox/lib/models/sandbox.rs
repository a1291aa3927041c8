use std::{
    fmt::{self, Display},
    str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::LazyboxError;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The lifecycle state of a sandbox.
///
/// `STOPPED` is the only quiescent state. There is no terminal state; a stopped sandbox can always
/// be woken again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxStatus {
    /// The record exists but provisioning has not finished.
    Pending,

    /// The compute backend has been asked to run one replica.
    Starting,

    /// The sandbox has served at least one proxied request since it was started.
    Running,

    /// An idle-check decided to shut the sandbox down.
    Stopping,

    /// The sandbox runs zero replicas.
    Stopped,
}

/// A sandbox is one ephemeral compute environment serving a single pull request's preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxRecord {
    /// Generated at creation, never reused.
    pub uuid: Uuid,

    /// The id of the user that requested the sandbox.
    pub created_by_user_id: u64,

    /// The pull-request number.
    pub pr: u64,

    /// The repository name.
    pub repository: String,

    /// The user handle.
    pub user: String,

    /// The lifecycle state.
    pub status: SandboxStatus,

    /// The derived routing domain, `<pr>-<repository>-<user>.<registry>.<base-domain>`.
    pub domain: String,

    /// The registry tag used in the domain.
    pub registry: String,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,

    /// The compute backend's template reference.
    pub template_ref: Option<String>,

    /// The service registry's entry reference.
    pub registry_ref: Option<String>,

    /// The compute backend's running-service reference.
    pub service_ref: Option<String>,

    /// The desired replica count, absent until the compute service exists.
    pub desired_tasks: Option<u8>,

    /// The scheduler's idle-check reference.
    pub schedule_ref: Option<String>,

    /// When the next idle-check fires, if one is pending.
    pub next_shutdown_at: Option<DateTime<Utc>>,
}

/// A partial update of a [`SandboxRecord`].
///
/// Only the fields that are set are written. `updated_at` is always written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxUpdate {
    /// The time of the write.
    pub updated_at: DateTime<Utc>,

    /// New lifecycle state.
    pub status: Option<SandboxStatus>,

    /// New template reference.
    pub template_ref: Option<String>,

    /// New registry reference.
    pub registry_ref: Option<String>,

    /// New service reference.
    pub service_ref: Option<String>,

    /// New desired replica count.
    pub desired_tasks: Option<u8>,

    /// New schedule reference.
    pub schedule_ref: Option<String>,

    /// `Some(None)` clears the next idle-check time.
    pub next_shutdown_at: Option<Option<DateTime<Utc>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxStatus {
    /// Returns the persisted representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxStatus::Pending => "PENDING",
            SandboxStatus::Starting => "STARTING",
            SandboxStatus::Running => "RUNNING",
            SandboxStatus::Stopping => "STOPPING",
            SandboxStatus::Stopped => "STOPPED",
        }
    }
}

impl SandboxRecord {
    /// Creates a new `PENDING` record with no collaborator references.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        uuid: Uuid,
        created_by_user_id: u64,
        pr: u64,
        repository: impl Into<String>,
        user: impl Into<String>,
        domain: impl Into<String>,
        registry: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            uuid,
            created_by_user_id,
            pr,
            repository: repository.into(),
            user: user.into(),
            status: SandboxStatus::Pending,
            domain: domain.into(),
            registry: registry.into(),
            created_at: now,
            updated_at: now,
            template_ref: None,
            registry_ref: None,
            service_ref: None,
            desired_tasks: None,
            schedule_ref: None,
            next_shutdown_at: None,
        }
    }

    /// Returns `true` if the sandbox is asleep and a request should wake it.
    pub fn is_idle(&self) -> bool {
        self.desired_tasks == Some(0) || self.status == SandboxStatus::Stopped
    }

    /// Applies a partial update in place.
    pub fn apply(&mut self, update: &SandboxUpdate) {
        self.updated_at = update.updated_at;

        if let Some(status) = update.status {
            self.status = status;
        }

        if let Some(template_ref) = &update.template_ref {
            self.template_ref = Some(template_ref.clone());
        }

        if let Some(registry_ref) = &update.registry_ref {
            self.registry_ref = Some(registry_ref.clone());
        }

        if let Some(service_ref) = &update.service_ref {
            self.service_ref = Some(service_ref.clone());
        }

        if let Some(desired_tasks) = update.desired_tasks {
            self.desired_tasks = Some(desired_tasks);
        }

        if let Some(schedule_ref) = &update.schedule_ref {
            self.schedule_ref = Some(schedule_ref.clone());
        }

        if let Some(next_shutdown_at) = update.next_shutdown_at {
            self.next_shutdown_at = next_shutdown_at;
        }
    }
}

impl SandboxUpdate {
    /// Creates an update that only bumps `updated_at`.
    pub fn new(updated_at: DateTime<Utc>) -> Self {
        Self {
            updated_at,
            status: None,
            template_ref: None,
            registry_ref: None,
            service_ref: None,
            desired_tasks: None,
            schedule_ref: None,
            next_shutdown_at: None,
        }
    }

    /// Sets the lifecycle state.
    pub fn status(mut self, status: SandboxStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the template reference.
    pub fn template_ref(mut self, template_ref: impl Into<String>) -> Self {
        self.template_ref = Some(template_ref.into());
        self
    }

    /// Sets the registry reference.
    pub fn registry_ref(mut self, registry_ref: impl Into<String>) -> Self {
        self.registry_ref = Some(registry_ref.into());
        self
    }

    /// Sets the service reference.
    pub fn service_ref(mut self, service_ref: impl Into<String>) -> Self {
        self.service_ref = Some(service_ref.into());
        self
    }

    /// Sets the desired replica count.
    pub fn desired_tasks(mut self, desired_tasks: u8) -> Self {
        self.desired_tasks = Some(desired_tasks);
        self
    }

    /// Sets the schedule reference.
    pub fn schedule_ref(mut self, schedule_ref: impl Into<String>) -> Self {
        self.schedule_ref = Some(schedule_ref.into());
        self
    }

    /// Sets or clears the next idle-check time.
    pub fn next_shutdown_at(mut self, next_shutdown_at: Option<DateTime<Utc>>) -> Self {
        self.next_shutdown_at = Some(next_shutdown_at);
        self
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Display for SandboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SandboxStatus {
    type Err = LazyboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(SandboxStatus::Pending),
            "STARTING" => Ok(SandboxStatus::Starting),
            "RUNNING" => Ok(SandboxStatus::Running),
            "STOPPING" => Ok(SandboxStatus::Stopping),
            "STOPPED" => Ok(SandboxStatus::Stopped),
            _ => Err(LazyboxError::InvalidStatus(s.to_string())),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
