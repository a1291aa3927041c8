use std::time::Instant;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use crate::{
    config::{RegistryConfig, TimeoutConfig},
    models::{Endpoint, RoutingKey},
    utils, LazyboxResult,
};

use super::{RegistryEntry, ServiceRegistry};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`ServiceRegistry`] speaking JSON to a discovery API.
///
/// Entries are named after the full sandbox host and live in one namespace:
///
/// - `POST /namespaces/{ns}/services` with `{"name": ..}` creates an entry, `409` if it exists
/// - `GET /namespaces/{ns}/services/{name}` fetches an entry
/// - `GET /namespaces/{ns}/services/{name}/instances` lists live instances
///
/// Transient failures are retried with exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpServiceRegistry {
    client: ClientWithMiddleware,
    base_url: String,
    namespace: String,
}

#[derive(Debug, Serialize)]
struct CreateEntryBody<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct InstancesResponse {
    #[serde(default)]
    instances: Vec<Endpoint>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HttpServiceRegistry {
    /// Creates a registry client from configuration.
    pub fn new(config: &RegistryConfig, timeouts: &TimeoutConfig) -> LazyboxResult<Self> {
        let client = utils::build_collaborator_client(
            timeouts.collaborator_timeout(),
            *timeouts.get_max_retries(),
        )?;

        Ok(Self {
            client,
            base_url: config.get_url().trim_end_matches('/').to_string(),
            namespace: config.get_namespace().clone(),
        })
    }

    fn services_url(&self) -> String {
        format!("{}/namespaces/{}/services", self.base_url, self.namespace)
    }

    async fn get_entry(&self, name: &str) -> LazyboxResult<RegistryEntry> {
        let response = self
            .client
            .get(format!("{}/{name}", self.services_url()))
            .send()
            .await?;

        let response = utils::check_status(response, "get registry entry").await?;
        Ok(response.json::<RegistryEntry>().await?)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ServiceRegistry for HttpServiceRegistry {
    async fn create_entry(&self, name: &str) -> LazyboxResult<RegistryEntry> {
        let response = self
            .client
            .post(self.services_url())
            .json(&CreateEntryBody { name })
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            tracing::info!("registry entry {name} already exists, reusing it");
            return self.get_entry(name).await;
        }

        let response = utils::check_status(response, "create registry entry").await?;
        Ok(response.json::<RegistryEntry>().await?)
    }

    async fn discover(&self, key: &RoutingKey) -> LazyboxResult<Option<Endpoint>> {
        let start = Instant::now();
        let host = key.host();
        let response = self
            .client
            .get(format!("{}/{host}/instances", self.services_url()))
            .send()
            .await?;

        // An unknown entry has no instances either.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = utils::check_status(response, "discover instances").await?;
        let body = response.json::<InstancesResponse>().await?;
        tracing::debug!(
            "discovered {} instance(s) for {host} in {}ms",
            body.instances.len(),
            start.elapsed().as_millis()
        );

        Ok(body.instances.into_iter().next())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
