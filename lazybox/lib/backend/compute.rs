use std::time::Instant;

use async_trait::async_trait;
use reqwest::Url;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};

use crate::{
    config::{ComputeConfig, TimeoutConfig},
    utils, LazyboxError, LazyboxResult,
};

use super::{ComputeBackend, ContainerSpec, CreateServiceRequest};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A [`ComputeBackend`] speaking JSON to an orchestrator's HTTP API.
///
/// Routes, relative to the configured base URL:
///
/// - `POST /clusters/{cluster}/templates` registers a template, answering `{"template_ref": ..}`
/// - `POST /clusters/{cluster}/services` creates a service, answering `{"service_ref": ..}`
/// - `PATCH /clusters/{cluster}/services/{service_ref}` updates the desired count
///
/// Path parameters are percent-encoded, so references containing `/` stay one segment.
///
/// Calls are not retried. Creating a service twice is not safe to repeat blindly.
#[derive(Debug, Clone)]
pub struct HttpComputeBackend {
    client: ClientWithMiddleware,
    base_url: Url,
    cluster: String,
}

#[derive(Debug, Serialize)]
struct RegisterTemplateBody<'a> {
    family: &'a str,
    #[serde(flatten)]
    spec: &'a ContainerSpec,
}

#[derive(Debug, Deserialize)]
struct RegisterTemplateResponse {
    template_ref: String,
}

#[derive(Debug, Deserialize)]
struct CreateServiceResponse {
    service_ref: String,
}

#[derive(Debug, Serialize)]
struct UpdateServiceBody {
    desired_count: u8,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl HttpComputeBackend {
    /// Creates a backend client from configuration.
    pub fn new(config: &ComputeConfig, timeouts: &TimeoutConfig) -> LazyboxResult<Self> {
        let client = utils::build_collaborator_client(timeouts.collaborator_timeout(), 0)?;
        let url = config.get_url();
        let base_url = Url::parse(url)
            .map_err(|e| LazyboxError::InvalidConfig(format!("invalid compute url {url:?}: {e}")))?;

        Ok(Self {
            client,
            base_url,
            cluster: config.get_cluster().clone(),
        })
    }

    fn cluster_url(&self, segments: &[&str]) -> LazyboxResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                LazyboxError::InvalidConfig(format!(
                    "compute url {} cannot have a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["clusters", self.cluster.as_str()])
            .extend(segments);

        Ok(url)
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ComputeBackend for HttpComputeBackend {
    async fn register_template(&self, family: &str, spec: &ContainerSpec) -> LazyboxResult<String> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.cluster_url(&["templates"])?)
            .json(&RegisterTemplateBody { family, spec })
            .send()
            .await?;

        let response = utils::check_status(response, "register template").await?;
        let body = response.json::<RegisterTemplateResponse>().await?;
        tracing::debug!(
            "registered template {family} in {}ms",
            start.elapsed().as_millis()
        );

        Ok(body.template_ref)
    }

    async fn create_service(&self, request: &CreateServiceRequest) -> LazyboxResult<String> {
        let start = Instant::now();
        let response = self
            .client
            .post(self.cluster_url(&["services"])?)
            .json(request)
            .send()
            .await?;

        let response = utils::check_status(response, "create service").await?;
        let body = response.json::<CreateServiceResponse>().await?;
        tracing::debug!(
            "created service {} in {}ms",
            request.name,
            start.elapsed().as_millis()
        );

        Ok(body.service_ref)
    }

    async fn set_desired_count(&self, service_ref: &str, count: u8) -> LazyboxResult<()> {
        let start = Instant::now();
        let response = self
            .client
            .patch(self.cluster_url(&["services", service_ref])?)
            .json(&UpdateServiceBody {
                desired_count: count,
            })
            .send()
            .await?;

        utils::check_status(response, "update service").await?;
        tracing::debug!(
            "set desired count of {service_ref} to {count} in {}ms",
            start.elapsed().as_millis()
        );

        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
