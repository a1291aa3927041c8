//! Wiring of the lifecycle controller to its collaborators.

use std::sync::Arc;

use crate::{
    backend::{
        ComputeBackend, ContainerSpec, HttpComputeBackend, HttpServiceRegistry,
        MemoryComputeBackend, MemoryServiceRegistry, ServiceRegistry,
    },
    config::LazyboxConfig,
    lifecycle::LifecycleController,
    scheduler::{ActionScheduler, MemoryScheduler, SqliteScheduler},
    store::{
        self, ActivityLog, MemoryActivityLog, MemorySandboxStore, SandboxStore, SqliteActivityLog,
        SqliteSandboxStore,
    },
    LazyboxResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The external systems the controller and gateway talk to.
#[derive(Clone)]
pub struct Collaborators {
    /// Sandbox records.
    pub store: Arc<dyn SandboxStore>,

    /// Per-sandbox request activity.
    pub activity: Arc<dyn ActivityLog>,

    /// Endpoint discovery.
    pub registry: Arc<dyn ServiceRegistry>,

    /// Container orchestration.
    pub compute: Arc<dyn ComputeBackend>,

    /// Idle-check timers.
    pub scheduler: Arc<dyn ActionScheduler>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Collaborators {
    /// Connects to the configured database and HTTP collaborators.
    ///
    /// The database is created and migrated if needed.
    pub async fn connect(config: &LazyboxConfig) -> LazyboxResult<Self> {
        let db_path = config.db_path();
        tracing::debug!("opening database at {}", db_path.display());
        let pool = store::get_or_create_db_pool(&db_path).await?;

        Ok(Self {
            store: Arc::new(SqliteSandboxStore::new(pool.clone())),
            activity: Arc::new(SqliteActivityLog::new(pool.clone())),
            registry: Arc::new(HttpServiceRegistry::new(
                config.get_registry(),
                config.get_timeouts(),
            )?),
            compute: Arc::new(HttpComputeBackend::new(
                config.get_compute(),
                config.get_timeouts(),
            )?),
            scheduler: Arc::new(SqliteScheduler::new(pool)),
        })
    }

    /// In-memory collaborators. Nothing survives the process.
    pub fn ephemeral() -> Self {
        Self {
            store: Arc::new(MemorySandboxStore::new()),
            activity: Arc::new(MemoryActivityLog::new()),
            registry: Arc::new(MemoryServiceRegistry::new()),
            compute: Arc::new(MemoryComputeBackend::new()),
            scheduler: Arc::new(MemoryScheduler::new()),
        }
    }

    /// Builds a controller over these collaborators.
    pub fn controller(&self, config: &LazyboxConfig) -> LifecycleController {
        let sandbox = config.get_sandbox();
        LifecycleController::builder()
            .store(Arc::clone(&self.store))
            .activity(Arc::clone(&self.activity))
            .registry(Arc::clone(&self.registry))
            .compute(Arc::clone(&self.compute))
            .scheduler(Arc::clone(&self.scheduler))
            .base_domain(sandbox.get_base_domain())
            .registry_tag(sandbox.get_registry_tag())
            .name_prefix(sandbox.get_name_prefix())
            .idle_window(sandbox.idle_window())
            .idle_check_retry(config.get_scheduler().idle_check_retry())
            .container(
                ContainerSpec::builder()
                    .image(sandbox.get_image())
                    .cpu(*sandbox.get_cpu())
                    .memory_mib(*sandbox.get_memory_mib())
                    .container_port(*sandbox.get_container_port())
                    .build(),
            )
            .build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
