use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{
    models::{Endpoint, RoutingKey},
    LazyboxResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What a sandbox container runs and how large it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct ContainerSpec {
    /// The container image.
    #[builder(setter(into))]
    pub image: String,

    /// CPU units.
    pub cpu: u32,

    /// Memory in MiB.
    pub memory_mib: u32,

    /// The port the container listens on.
    pub container_port: u16,
}

/// A request to run a sandbox service on the compute backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct CreateServiceRequest {
    /// The service name, `<prefix>-<uuid>`.
    #[builder(setter(into))]
    pub name: String,

    /// The template registered for this sandbox.
    #[builder(setter(into))]
    pub template_ref: String,

    /// The registry entry instances are announced under.
    #[builder(setter(into))]
    pub registry_ref: String,

    /// Initial replica count.
    #[builder(default = 1)]
    pub desired_count: u8,

    /// Tags attached to the service.
    #[builder(default)]
    pub tags: BTreeMap<String, String>,
}

/// An entry in the service registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// The opaque reference of the entry.
    pub id: String,

    /// The name the entry was created under, the sandbox domain.
    pub name: String,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// The external orchestrator that runs sandbox workloads.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Registers a container template under `family` and returns its reference.
    async fn register_template(&self, family: &str, spec: &ContainerSpec) -> LazyboxResult<String>;

    /// Creates a service and returns its reference.
    async fn create_service(&self, request: &CreateServiceRequest) -> LazyboxResult<String>;

    /// Sets the number of replicas the backend should converge to.
    ///
    /// Setting the count a service already has is a no-op.
    async fn set_desired_count(&self, service_ref: &str, count: u8) -> LazyboxResult<()>;
}

/// The service-discovery system mapping a routing key to a live endpoint.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Creates an entry named `name`.
    ///
    /// An entry that already exists is returned instead of failing.
    async fn create_entry(&self, name: &str) -> LazyboxResult<RegistryEntry>;

    /// Resolves a routing key to zero or one live endpoint.
    ///
    /// When several instances are registered the first one wins.
    async fn discover(&self, key: &RoutingKey) -> LazyboxResult<Option<Endpoint>>;
}
