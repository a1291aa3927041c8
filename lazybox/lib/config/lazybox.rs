//! Lazybox configuration types and helpers.

use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};

use getset::Getters;
use serde::{Deserialize, Serialize};
use tokio::fs;
use typed_builder::TypedBuilder;

use super::{
    DEFAULT_BASE_DOMAIN, DEFAULT_COLLABORATOR_TIMEOUT_SECS, DEFAULT_COMMAND_QUEUE_SIZE,
    DEFAULT_COMPUTE_CLUSTER, DEFAULT_COMPUTE_URL, DEFAULT_CONTAINER_CPU, DEFAULT_CONTAINER_IMAGE,
    DEFAULT_CONTAINER_MEMORY_MIB, DEFAULT_CONTAINER_PORT, DEFAULT_CONTROL_ADDR,
    DEFAULT_FORWARD_TIMEOUT_SECS, DEFAULT_GATEWAY_ADDR, DEFAULT_IDLE_CHECK_RETRY_SECS,
    DEFAULT_IDLE_WINDOW_SECS,
    DEFAULT_MAX_FORWARD_BODY_BYTES, DEFAULT_MAX_RETRIES, DEFAULT_NAME_PREFIX,
    DEFAULT_REGISTRY_NAMESPACE, DEFAULT_REGISTRY_TAG, DEFAULT_REGISTRY_URL,
    DEFAULT_SCHEDULER_POLL_INTERVAL_SECS,
};
use crate::{utils, LazyboxError, LazyboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The lazybox configuration.
#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct LazyboxConfig {
    /// Listen addresses.
    #[builder(default)]
    server: ServerConfig,

    /// How sandboxes are named, sized and put to sleep.
    #[builder(default)]
    sandbox: SandboxConfig,

    /// The metadata store.
    #[builder(default)]
    store: StoreConfig,

    /// The compute orchestrator.
    #[builder(default)]
    compute: ComputeConfig,

    /// The service registry.
    #[builder(default)]
    registry: RegistryConfig,

    /// The delayed-action scheduler.
    #[builder(default)]
    scheduler: SchedulerConfig,

    /// Timeouts and retries for outbound calls.
    #[builder(default)]
    timeouts: TimeoutConfig,
}

/// Listen addresses of the control API and the routing gateway.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct ServerConfig {
    /// Where the control API listens.
    #[builder(default = *DEFAULT_CONTROL_ADDR)]
    control_addr: SocketAddr,

    /// Where the routing gateway listens.
    #[builder(default = *DEFAULT_GATEWAY_ADDR)]
    gateway_addr: SocketAddr,
}

/// Sandbox naming, sizing and idle policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct SandboxConfig {
    /// The public base domain sandboxes are served under.
    #[builder(default = DEFAULT_BASE_DOMAIN.to_string(), setter(into))]
    base_domain: String,

    /// The registry tag, the second label of every sandbox host.
    #[builder(default = DEFAULT_REGISTRY_TAG.to_string(), setter(into))]
    registry_tag: String,

    /// Prefix for compute services and schedules.
    #[builder(default = DEFAULT_NAME_PREFIX.to_string(), setter(into))]
    name_prefix: String,

    /// Seconds without traffic before a sandbox goes idle.
    #[builder(default = DEFAULT_IDLE_WINDOW_SECS)]
    idle_window_secs: u64,

    /// Origin prepended to the `/starting/...` redirect, e.g. `https://sb.example.com`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    starting_page_origin: Option<String>,

    /// The container image sandboxes run.
    #[builder(default = DEFAULT_CONTAINER_IMAGE.to_string(), setter(into))]
    image: String,

    /// CPU units per sandbox.
    #[builder(default = DEFAULT_CONTAINER_CPU)]
    cpu: u32,

    /// Memory in MiB per sandbox.
    #[builder(default = DEFAULT_CONTAINER_MEMORY_MIB)]
    memory_mib: u32,

    /// The port the container listens on.
    #[builder(default = DEFAULT_CONTAINER_PORT)]
    container_port: u16,
}

/// The metadata store.
#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database. Defaults to `$LAZYBOX_HOME/lazybox.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    path: Option<PathBuf>,
}

/// The compute orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct ComputeConfig {
    /// Base URL of the orchestrator API.
    #[builder(default = DEFAULT_COMPUTE_URL.to_string(), setter(into))]
    url: String,

    /// The cluster services are created in.
    #[builder(default = DEFAULT_COMPUTE_CLUSTER.to_string(), setter(into))]
    cluster: String,
}

/// The service registry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the discovery API.
    #[builder(default = DEFAULT_REGISTRY_URL.to_string(), setter(into))]
    url: String,

    /// The namespace entries are registered in.
    #[builder(default = DEFAULT_REGISTRY_NAMESPACE.to_string(), setter(into))]
    namespace: String,
}

/// The local delayed-action scheduler.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between scans for due idle-checks.
    #[builder(default = DEFAULT_SCHEDULER_POLL_INTERVAL_SECS)]
    poll_interval_secs: u64,

    /// Capacity of the lifecycle command queue.
    #[builder(default = DEFAULT_COMMAND_QUEUE_SIZE)]
    command_queue_size: usize,

    /// Seconds until a failed idle-check is tried again.
    #[builder(default = DEFAULT_IDLE_CHECK_RETRY_SECS)]
    idle_check_retry_secs: u64,
}

/// Timeouts and retries for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connect and read timeout for collaborator calls, in seconds.
    #[builder(default = DEFAULT_COLLABORATOR_TIMEOUT_SECS)]
    collaborator_secs: u64,

    /// Timeout for forwarded requests, in seconds.
    #[builder(default = DEFAULT_FORWARD_TIMEOUT_SECS)]
    forward_secs: u64,

    /// Retries for discovery calls.
    #[builder(default = DEFAULT_MAX_RETRIES)]
    max_retries: u32,

    /// The largest request body the gateway forwards.
    #[builder(default = DEFAULT_MAX_FORWARD_BODY_BYTES)]
    max_forward_body_bytes: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LazyboxConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// A missing file yields the default configuration. The result is validated either way.
    pub async fn load(path: impl AsRef<Path>) -> LazyboxResult<Self> {
        let path = path.as_ref();
        let config = if fs::try_exists(path).await? {
            tracing::debug!("loading config from {}", path.display());
            Self::from_toml_str(&fs::read_to_string(path).await?)?
        } else {
            tracing::info!(
                "config file {} not found, using defaults",
                path.display()
            );
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses the configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> LazyboxResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Checks that the configuration can drive a gateway and controller.
    pub fn validate(&self) -> LazyboxResult<()> {
        let sandbox = &self.sandbox;
        if sandbox.base_domain.is_empty() {
            return Err(LazyboxError::InvalidConfig(
                "sandbox.base_domain must not be empty".to_string(),
            ));
        }

        let base_labels = sandbox.base_domain.split('.').count();
        if !(2..=3).contains(&base_labels) || sandbox.base_domain.split('.').any(str::is_empty) {
            return Err(LazyboxError::InvalidConfig(format!(
                "sandbox.base_domain must have two or three labels, got {:?}",
                sandbox.base_domain
            )));
        }

        if sandbox.registry_tag.is_empty() || sandbox.registry_tag.contains('.') {
            return Err(LazyboxError::InvalidConfig(format!(
                "sandbox.registry_tag must be a single label, got {:?}",
                sandbox.registry_tag
            )));
        }

        if sandbox.idle_window_secs == 0 {
            return Err(LazyboxError::InvalidConfig(
                "sandbox.idle_window_secs must be greater than zero".to_string(),
            ));
        }

        if self.scheduler.poll_interval_secs == 0 || self.scheduler.command_queue_size == 0 {
            return Err(LazyboxError::InvalidConfig(
                "scheduler.poll_interval_secs and scheduler.command_queue_size must be greater than zero"
                    .to_string(),
            ));
        }

        if self.scheduler.idle_check_retry_secs == 0 {
            return Err(LazyboxError::InvalidConfig(
                "scheduler.idle_check_retry_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns the database path, falling back to `$LAZYBOX_HOME/lazybox.db`.
    pub fn db_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| utils::get_lazybox_home_path().join(utils::LAZYBOX_DB_FILENAME))
    }
}

impl SandboxConfig {
    /// Returns the idle window as a `chrono` duration.
    pub fn idle_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_window_secs as i64)
    }
}

impl SchedulerConfig {
    /// Returns the poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Returns the idle-check retry delay as a `chrono` duration.
    pub fn idle_check_retry(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_check_retry_secs as i64)
    }
}

impl TimeoutConfig {
    /// Returns the collaborator timeout.
    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_secs)
    }

    /// Returns the forwarding timeout.
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_secs(self.forward_secs)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
