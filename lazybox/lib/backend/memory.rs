use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    models::{Endpoint, RoutingKey},
    LazyboxError, LazyboxResult,
};

use super::{ComputeBackend, ContainerSpec, CreateServiceRequest, RegistryEntry, ServiceRegistry};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An in-process [`ComputeBackend`] that records what it was asked to run.
#[derive(Debug, Clone, Default)]
pub struct MemoryComputeBackend {
    inner: Arc<RwLock<ComputeState>>,
}

/// A service known to the [`MemoryComputeBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryService {
    /// The request the service was created from.
    pub request: CreateServiceRequest,

    /// The replica count the service should converge to.
    pub desired_count: u8,

    /// How many times the desired count was set after creation.
    pub updates: usize,
}

#[derive(Debug, Default)]
struct ComputeState {
    templates: Vec<(String, ContainerSpec)>,
    services: HashMap<String, MemoryService>,
}

/// An in-process [`ServiceRegistry`].
///
/// Entries are keyed by host. Tests register endpoints to simulate a running sandbox.
#[derive(Debug, Clone, Default)]
pub struct MemoryServiceRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

#[derive(Debug, Default)]
struct RegistryState {
    entries: HashMap<String, RegistryEntry>,
    endpoints: HashMap<String, Endpoint>,
    lookups: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl MemoryComputeBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a service by reference.
    pub async fn service(&self, service_ref: &str) -> Option<MemoryService> {
        self.inner.read().await.services.get(service_ref).cloned()
    }

    /// Returns how many services were created.
    pub async fn service_count(&self) -> usize {
        self.inner.read().await.services.len()
    }

    /// Returns how many templates were registered.
    pub async fn template_count(&self) -> usize {
        self.inner.read().await.templates.len()
    }
}

impl MemoryServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a live endpoint for `host`.
    pub async fn set_endpoint(&self, host: impl Into<String>, endpoint: Endpoint) {
        self.inner
            .write()
            .await
            .endpoints
            .insert(host.into(), endpoint);
    }

    /// Removes the live endpoint for `host`.
    pub async fn clear_endpoint(&self, host: &str) {
        self.inner.write().await.endpoints.remove(host);
    }

    /// Returns an entry by name.
    pub async fn entry(&self, name: &str) -> Option<RegistryEntry> {
        self.inner.read().await.entries.get(name).cloned()
    }

    /// Returns how many times [`ServiceRegistry::discover`] was called.
    pub async fn lookups(&self) -> usize {
        self.inner.read().await.lookups
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ComputeBackend for MemoryComputeBackend {
    async fn register_template(&self, family: &str, spec: &ContainerSpec) -> LazyboxResult<String> {
        let mut state = self.inner.write().await;
        state.templates.push((family.to_string(), spec.clone()));
        Ok(format!("template/{family}:{}", state.templates.len()))
    }

    async fn create_service(&self, request: &CreateServiceRequest) -> LazyboxResult<String> {
        let mut state = self.inner.write().await;
        let service_ref = format!("service/{}", request.name);
        if state.services.contains_key(&service_ref) {
            return Err(LazyboxError::Conflict(format!(
                "service {} already exists",
                request.name
            )));
        }

        state.services.insert(
            service_ref.clone(),
            MemoryService {
                request: request.clone(),
                desired_count: request.desired_count,
                updates: 0,
            },
        );

        Ok(service_ref)
    }

    async fn set_desired_count(&self, service_ref: &str, count: u8) -> LazyboxResult<()> {
        let mut state = self.inner.write().await;
        let service = state.services.get_mut(service_ref).ok_or_else(|| {
            LazyboxError::Upstream(format!("service {service_ref} does not exist"))
        })?;

        service.desired_count = count;
        service.updates += 1;
        Ok(())
    }
}

#[async_trait]
impl ServiceRegistry for MemoryServiceRegistry {
    async fn create_entry(&self, name: &str) -> LazyboxResult<RegistryEntry> {
        let mut state = self.inner.write().await;
        let next_id = state.entries.len() + 1;
        let entry = state
            .entries
            .entry(name.to_string())
            .or_insert_with(|| RegistryEntry {
                id: format!("registry/{next_id}"),
                name: name.to_string(),
            });

        Ok(entry.clone())
    }

    async fn discover(&self, key: &RoutingKey) -> LazyboxResult<Option<Endpoint>> {
        let mut state = self.inner.write().await;
        state.lookups += 1;
        Ok(state.endpoints.get(&key.host()).cloned())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_registry_create_entry_is_idempotent() -> LazyboxResult<()> {
        let registry = MemoryServiceRegistry::new();
        let first = registry.create_entry("1-a-b.gh.example.com").await?;
        let second = registry.create_entry("1-a-b.gh.example.com").await?;
        assert_eq!(first, second);

        let key: RoutingKey = "1-a-b.gh.example.com".parse()?;
        assert_eq!(registry.discover(&key).await?, None);

        registry
            .set_endpoint("1-a-b.gh.example.com", Endpoint::new("127.0.0.1", Some(80)))
            .await;
        assert!(registry.discover(&key).await?.is_some());
        assert_eq!(registry.lookups().await, 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_memory_compute_tracks_desired_count() -> LazyboxResult<()> {
        let backend = MemoryComputeBackend::new();
        let request = CreateServiceRequest::builder()
            .name("lazybox-1")
            .template_ref("template/lazybox-1:1")
            .registry_ref("registry/1")
            .build();

        let service_ref = backend.create_service(&request).await?;
        backend.set_desired_count(&service_ref, 0).await?;

        let service = backend.service(&service_ref).await.unwrap();
        assert_eq!(service.desired_count, 0);
        assert_eq!(service.updates, 1);

        assert!(backend.set_desired_count("service/missing", 1).await.is_err());
        assert!(backend.create_service(&request).await.is_err());

        Ok(())
    }
}
