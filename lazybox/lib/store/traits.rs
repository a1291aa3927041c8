use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    models::{SandboxRecord, SandboxUpdate},
    LazyboxResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One inbound request recorded against a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// When the request arrived.
    pub timestamp: DateTime<Utc>,

    /// A human readable description of the request.
    pub message: String,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The durable record of each sandbox's identity and lifecycle state.
///
/// Records are keyed by uuid with a unique secondary index on domain. Writes are not
/// transactional across calls, so readers must tolerate a record observed mid-provisioning.
#[async_trait]
pub trait SandboxStore: Send + Sync {
    /// Inserts a new record.
    ///
    /// Fails with `Conflict` if the uuid or the domain is already taken.
    async fn insert(&self, record: &SandboxRecord) -> LazyboxResult<()>;

    /// Gets a record by uuid.
    async fn get(&self, uuid: &Uuid) -> LazyboxResult<Option<SandboxRecord>>;

    /// Gets a record through the domain index.
    async fn find_by_domain(&self, domain: &str) -> LazyboxResult<Option<SandboxRecord>>;

    /// Writes the fields set in `update`.
    ///
    /// Fails with `SandboxNotFound` if no record exists for `uuid`.
    async fn update(&self, uuid: &Uuid, update: &SandboxUpdate) -> LazyboxResult<()>;

    /// Lists all records, oldest first.
    async fn list(&self) -> LazyboxResult<Vec<SandboxRecord>>;
}

/// An append-only per-sandbox stream of request timestamps.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Opens the stream for a sandbox. Opening an existing stream is a no-op.
    async fn open_stream(&self, uuid: &Uuid) -> LazyboxResult<()>;

    /// Appends an event to an open stream.
    ///
    /// Fails with `SandboxNotFound` if the stream was never opened.
    async fn append(&self, uuid: &Uuid, event: &ActivityEvent) -> LazyboxResult<()>;

    /// Returns `true` if at least one event falls within `[from, to]`.
    async fn has_activity(
        &self,
        uuid: &Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LazyboxResult<bool>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ActivityEvent {
    /// Creates the event recorded for a proxied request.
    pub fn request(host: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            message: format!("Request at {} for {host}", timestamp.timestamp_millis()),
            timestamp,
        }
    }
}
