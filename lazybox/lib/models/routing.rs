use std::{
    fmt::{self, Display},
    str::FromStr,
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{LazyboxError, LazyboxResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The fewest dot-separated labels a sandbox host can have.
pub const MIN_HOST_LABELS: usize = 4;

/// The most dot-separated labels a sandbox host can have.
pub const MAX_HOST_LABELS: usize = 5;

/// Pattern for the repository and user parts of a service name.
static NAME_PART_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap());

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The `(service_name, registry_tag, base_domain)` tuple used to resolve a live endpoint.
///
/// A host decomposes as `<service>.<registry>.<base-domain>` where the base domain takes the
/// remaining two or three labels, so `a.b.example.com` and `a.b.example.co.uk` both parse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey {
    /// The first label, `<pr>-<repository>-<user>`.
    pub service_name: String,

    /// The second label.
    pub registry_tag: String,

    /// Everything after the registry tag.
    pub base_domain: String,
}

/// A live network endpoint of a sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// The private address of the instance.
    pub address: String,

    /// The port, if the registry reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RoutingKey {
    /// Creates a new routing key.
    pub fn new(
        service_name: impl Into<String>,
        registry_tag: impl Into<String>,
        base_domain: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            registry_tag: registry_tag.into(),
            base_domain: base_domain.into(),
        }
    }

    /// Returns the full host, which is also the sandbox's domain.
    pub fn host(&self) -> String {
        self.to_string()
    }
}

impl Endpoint {
    /// Creates a new endpoint.
    pub fn new(address: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Returns the `http://` base URL for this endpoint.
    pub fn base_url(&self) -> String {
        format!("http://{self}")
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the service label of a sandbox, `<pr>-<repository>-<user>`.
pub fn service_name(pr: u64, repository: &str, user: &str) -> String {
    format!("{pr}-{repository}-{user}")
}

/// Derives the routing domain of a sandbox.
///
/// The result is a pure function of its inputs, so two provisioning calls with identical inputs
/// produce the same domain. It is lowercase, matching the hosts clients send.
pub fn derive_domain(
    pr: u64,
    repository: &str,
    user: &str,
    registry_tag: &str,
    base_domain: &str,
) -> String {
    format!(
        "{}.{registry_tag}.{base_domain}",
        service_name(pr, repository, user)
    )
    .to_ascii_lowercase()
}

/// Checks that a repository or user name can be embedded in a single DNS label.
pub fn validate_name_part(field: &str, value: &str) -> LazyboxResult<()> {
    if !NAME_PART_REGEX.is_match(value) {
        return Err(LazyboxError::Validation(format!(
            "{field} must be alphanumeric with '-' or '_' and start with an alphanumeric, got {value:?}"
        )));
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromStr for RoutingKey {
    type Err = LazyboxError;

    fn from_str(host: &str) -> Result<Self, Self::Err> {
        // Drop the port, if any.
        let hostname = match host.rsplit_once(':') {
            Some((hostname, port)) if port.chars().all(|c| c.is_ascii_digit()) => hostname,
            _ => host,
        };

        // Host names compare case-insensitively.
        let hostname = hostname.to_ascii_lowercase();
        let labels: Vec<&str> = hostname.split('.').collect();
        if !(MIN_HOST_LABELS..=MAX_HOST_LABELS).contains(&labels.len())
            || labels.iter().any(|label| label.is_empty())
        {
            return Err(LazyboxError::InvalidHost(host.to_string()));
        }

        Ok(Self {
            service_name: labels[0].to_string(),
            registry_tag: labels[1].to_string(),
            base_domain: labels[2..].join("."),
        })
    }
}

impl Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.service_name, self.registry_tag, self.base_domain
        )
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.address, port),
            None => write!(f, "{}", self.address),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
