use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::LazyLock,
};

use crate::utils::LAZYBOX_HOME_DIR;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long a sandbox may go without traffic before an idle-check shuts it down.
pub const DEFAULT_IDLE_WINDOW_SECS: u64 = 600;

/// Connect and read timeout for registry, compute and scheduler calls.
pub const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 2;

/// Timeout for requests forwarded to a sandbox.
pub const DEFAULT_FORWARD_TIMEOUT_SECS: u64 = 10;

/// Retries for discovery calls before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// The largest request body the gateway will buffer and forward.
pub const DEFAULT_MAX_FORWARD_BODY_BYTES: usize = 10 * 1024 * 1024;

/// How often the local scheduler looks for due idle-checks.
pub const DEFAULT_SCHEDULER_POLL_INTERVAL_SECS: u64 = 5;

/// Capacity of the lifecycle command queue.
pub const DEFAULT_COMMAND_QUEUE_SIZE: usize = 256;

/// How far ahead a failed idle-check is re-armed.
pub const DEFAULT_IDLE_CHECK_RETRY_SECS: u64 = 60;

/// Default port for the control API.
pub const DEFAULT_CONTROL_PORT: u16 = 3456;

/// Default port for the routing gateway.
pub const DEFAULT_GATEWAY_PORT: u16 = 8080;

/// Default public base domain.
pub const DEFAULT_BASE_DOMAIN: &str = "example.com";

/// Default registry tag, the second label of every sandbox host.
pub const DEFAULT_REGISTRY_TAG: &str = "gh";

/// Prefix for compute services and schedules.
pub const DEFAULT_NAME_PREFIX: &str = "lazybox";

/// Default container image for sandboxes.
pub const DEFAULT_CONTAINER_IMAGE: &str = "nginxdemos/hello";

/// Default CPU units for a sandbox container.
pub const DEFAULT_CONTAINER_CPU: u32 = 256;

/// Default memory in MiB for a sandbox container.
pub const DEFAULT_CONTAINER_MEMORY_MIB: u32 = 512;

/// Default port the sandbox container listens on.
pub const DEFAULT_CONTAINER_PORT: u16 = 80;

/// Default compute orchestrator API.
pub const DEFAULT_COMPUTE_URL: &str = "http://127.0.0.1:4000";

/// Default compute cluster.
pub const DEFAULT_COMPUTE_CLUSTER: &str = "default";

/// Default service registry API.
pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:4001";

/// Default service registry namespace.
pub const DEFAULT_REGISTRY_NAMESPACE: &str = "lazybox.local";

/// The path where all lazybox global data is stored. Relative to the working directory when
/// there is no home directory.
pub static DEFAULT_LAZYBOX_HOME: LazyLock<PathBuf> =
    LazyLock::new(|| dirs::home_dir().unwrap_or_default().join(LAZYBOX_HOME_DIR));

/// Default listen address of the control API.
pub static DEFAULT_CONTROL_ADDR: LazyLock<SocketAddr> = LazyLock::new(|| {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_CONTROL_PORT)
});

/// Default listen address of the routing gateway.
pub static DEFAULT_GATEWAY_ADDR: LazyLock<SocketAddr> = LazyLock::new(|| {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_GATEWAY_PORT)
});
