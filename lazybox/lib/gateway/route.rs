use std::sync::Arc;

use axum::{
    body::{self, Body},
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use chrono::Utc;
use typed_builder::TypedBuilder;

use crate::{
    backend::ServiceRegistry,
    config::DEFAULT_MAX_FORWARD_BODY_BYTES,
    lifecycle::{CommandSender, LifecycleCommand},
    models::{RoutingKey, SandboxRecord, SandboxStatus, SandboxUpdate},
    server::ErrorResponse,
    store::{ActivityEvent, ActivityLog, SandboxStore},
    LazyboxError, LazyboxResult,
};

use super::forward;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Resolves sandbox hosts to live endpoints and forwards requests to them.
///
/// A host with no live endpoint whose sandbox is asleep gets a start command queued and the
/// caller is redirected to the waiting page. The request never waits for the sandbox.
#[derive(TypedBuilder)]
pub struct Gateway {
    store: Arc<dyn SandboxStore>,

    activity: Arc<dyn ActivityLog>,

    registry: Arc<dyn ServiceRegistry>,

    commands: CommandSender,

    /// Client for forwarded requests.
    client: reqwest::Client,

    /// The only base domain this gateway serves.
    #[builder(setter(into))]
    base_domain: String,

    /// Prepended to the `/starting/...` redirect.
    #[builder(default, setter(into))]
    starting_page_origin: Option<String>,

    /// Largest request body that is forwarded.
    #[builder(default = DEFAULT_MAX_FORWARD_BODY_BYTES)]
    max_body_bytes: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Gateway {
    /// Wraps the gateway in a router answering every path.
    pub fn into_router(self) -> Router {
        Router::new()
            .fallback(gateway_handler)
            .with_state(Arc::new(self))
    }

    /// Routes one request. Failures become JSON error responses.
    pub async fn route(&self, request: Request) -> Response {
        match self.try_route(request).await {
            Ok(response) => response,
            Err(e) => {
                let (status, error) = ErrorResponse::from_error(&e);
                if status.is_server_error() {
                    tracing::error!("gateway request failed: {e}");
                } else {
                    tracing::debug!("gateway request rejected: {e}");
                }
                (status, axum::Json(error)).into_response()
            }
        }
    }

    async fn try_route(&self, request: Request) -> LazyboxResult<Response> {
        let host = request_host(&request)?;
        let key: RoutingKey = host.parse()?;
        if !key.base_domain.eq_ignore_ascii_case(&self.base_domain) {
            return Err(LazyboxError::DomainMismatch(host));
        }

        forward::check_method(request.method())?;

        let Some(endpoint) = self.registry.discover(&key).await? else {
            return self.wake(&key).await;
        };

        let record = self.record_activity(&key).await;

        let (parts, body) = request.into_parts();
        let body = body::to_bytes(body, self.max_body_bytes)
            .await
            .map_err(|e| LazyboxError::Validation(format!("unreadable request body: {e}")))?;
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        let forwarded = forward::forward(
            &self.client,
            &endpoint,
            parts.method.clone(),
            path_and_query,
            forward::forward_headers(&parts.headers),
            body,
        )
        .await?;

        if let Some(record) = record {
            self.promote(&record).await;
        }

        forwarded.into_response()
    }

    /// Queues a start for a sleeping sandbox and redirects to the waiting page.
    async fn wake(&self, key: &RoutingKey) -> LazyboxResult<Response> {
        let host = key.host();
        let Some(record) = self.store.find_by_domain(&host).await? else {
            return Err(LazyboxError::SandboxNotFound(host));
        };

        if record.is_idle() {
            tracing::info!("waking sandbox {} for {host}", record.uuid);
            self.commands
                .dispatch(LifecycleCommand::StartOrRestart { uuid: record.uuid });
        } else {
            tracing::debug!("sandbox {} is {}, not waking it", record.uuid, record.status);
        }

        Ok((
            StatusCode::FOUND,
            [(header::LOCATION, self.starting_location(key))],
        )
            .into_response())
    }

    /// Appends an activity event for the host. Never fails the request.
    async fn record_activity(&self, key: &RoutingKey) -> Option<SandboxRecord> {
        let host = key.host();
        let record = match self.store.find_by_domain(&host).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!("no sandbox record for live host {host}");
                return None;
            }
            Err(e) => {
                tracing::warn!("failed to look up sandbox for {host}: {e}");
                return None;
            }
        };

        let event = ActivityEvent::request(&host, Utc::now());
        if let Err(e) = self.activity.append(&record.uuid, &event).await {
            tracing::warn!("failed to record activity for {}: {e}", record.uuid);
        }

        Some(record)
    }

    /// A sandbox that answered is running.
    async fn promote(&self, record: &SandboxRecord) {
        if !matches!(
            record.status,
            SandboxStatus::Pending | SandboxStatus::Starting
        ) {
            return;
        }

        let update = SandboxUpdate::new(Utc::now()).status(SandboxStatus::Running);
        match self.store.update(&record.uuid, &update).await {
            Ok(()) => tracing::info!("sandbox {} is running", record.uuid),
            Err(e) => tracing::warn!("failed to mark sandbox {} running: {e}", record.uuid),
        }
    }

    fn starting_location(&self, key: &RoutingKey) -> String {
        format!(
            "{}/starting/{}/{}",
            self.starting_page_origin
                .as_deref()
                .unwrap_or_default()
                .trim_end_matches('/'),
            key.registry_tag,
            key.service_name
        )
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn gateway_handler(State(gateway): State<Arc<Gateway>>, request: Request<Body>) -> Response {
    gateway.route(request).await
}

/// Returns the host a request was sent to, from the `Host` header or an absolute URI.
fn request_host(request: &Request) -> LazyboxResult<String> {
    if let Some(host) = request.headers().get(header::HOST) {
        return host
            .to_str()
            .map(str::to_string)
            .map_err(|_| LazyboxError::InvalidHost("non-ascii host header".to_string()));
    }

    request
        .uri()
        .authority()
        .map(|authority| authority.to_string())
        .ok_or_else(|| LazyboxError::InvalidHost("missing host".to_string()))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
