//! HTTP request handlers for the control API.
//!
//! The handlers coordinate with the lifecycle controller. Start and idle-check requests run
//! synchronously so that an unknown sandbox is reported to the caller.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::{
    data::{
        IdleCheckRequest, IdleCheckResponse, ProvisionRequest, SandboxListResponse, StartRequest,
        StartResponse, StatusResponse,
    },
    state::ServerState,
};
use crate::{
    lifecycle::Provisioned,
    models::{self, SandboxRecord},
    LazyboxError, LazyboxResult,
};

//-------------------------------------------------------------------------------------------------
// Functions: Handlers
//-------------------------------------------------------------------------------------------------

/// Handler for the POST /sandboxes endpoint
///
/// Provisions a sandbox for a pull request
pub async fn provision_handler(
    State(state): State<ServerState>,
    body: Result<Json<ProvisionRequest>, JsonRejection>,
) -> Response {
    match handle_provision(state, body).await {
        Ok(provisioned) => (StatusCode::OK, Json(provisioned)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for the GET /sandboxes endpoint
pub async fn list_handler(State(state): State<ServerState>) -> Response {
    match state.controller().sandboxes().await {
        Ok(sandboxes) => (StatusCode::OK, Json(SandboxListResponse { sandboxes })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for the GET /sandboxes/{uuid} endpoint
pub async fn show_handler(
    State(state): State<ServerState>,
    Path(uuid): Path<String>,
) -> Response {
    match handle_show(state, &uuid).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for the POST /sandboxes/start endpoint
///
/// Scales a sandbox up and re-arms its idle-check
pub async fn start_handler(
    State(state): State<ServerState>,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> Response {
    match handle_start(state, body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for the POST /sandboxes/idle-check endpoint
pub async fn idle_check_handler(
    State(state): State<ServerState>,
    body: Result<Json<IdleCheckRequest>, JsonRejection>,
) -> Response {
    match handle_idle_check(state, body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for the GET /starting/{registry}/{service} endpoint
///
/// Serves the page a woken sandbox's visitors wait on. It reloads into the sandbox until the
/// gateway stops redirecting.
pub async fn starting_page_handler(
    State(state): State<ServerState>,
    Path((registry, service)): Path<(String, String)>,
) -> Response {
    match handle_starting_page(&state, &registry, &service) {
        Ok(page) => (StatusCode::OK, Html(page)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Handler for the GET /health endpoint
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(StatusResponse::ok()))
}

//-------------------------------------------------------------------------------------------------
// Functions: Implementations
//-------------------------------------------------------------------------------------------------

/// Implementation of the provision operation
async fn handle_provision(
    state: ServerState,
    body: Result<Json<ProvisionRequest>, JsonRejection>,
) -> LazyboxResult<Provisioned> {
    let Json(request) = body.map_err(rejection)?;
    let input = request.into_input()?;
    let provisioned = state.controller().provision(&input).await?;
    tracing::info!(
        "provisioned sandbox {} at {}",
        provisioned.service_uuid,
        provisioned.domain
    );

    Ok(provisioned)
}

/// Implementation of the show operation
async fn handle_show(state: ServerState, uuid: &str) -> LazyboxResult<SandboxRecord> {
    let uuid = parse_uuid(uuid)?;
    state.controller().sandbox(&uuid).await
}

/// Implementation of the start operation
async fn handle_start(
    state: ServerState,
    body: Result<Json<StartRequest>, JsonRejection>,
) -> LazyboxResult<StartResponse> {
    let Json(request) = body.map_err(rejection)?;
    let service_uuid = request
        .service_uuid
        .ok_or_else(|| LazyboxError::Validation("missing field: service_uuid".to_string()))?;

    let next_check_at = state.controller().start_or_restart(&service_uuid).await?;
    Ok(StartResponse {
        service_uuid,
        next_check_at,
    })
}

/// Implementation of the idle-check operation
async fn handle_idle_check(
    state: ServerState,
    body: Result<Json<IdleCheckRequest>, JsonRejection>,
) -> LazyboxResult<IdleCheckResponse> {
    let Json(request) = body.map_err(rejection)?;
    let service_uuid = request
        .service_uuid
        .ok_or_else(|| LazyboxError::Validation("missing field: service_uuid".to_string()))?;

    let outcome = state
        .controller()
        .idle_check(&service_uuid, request.force_shutdown)
        .await?;

    Ok(IdleCheckResponse {
        service_uuid,
        outcome,
    })
}

/// Renders the waiting page for a sandbox host
fn handle_starting_page(
    state: &ServerState,
    registry: &str,
    service: &str,
) -> LazyboxResult<String> {
    models::validate_name_part("registry", registry)?;
    models::validate_name_part("service", service)?;

    let host = format!(
        "{service}.{registry}.{}",
        state.controller().get_base_domain()
    );

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta http-equiv="refresh" content="5; url=//{host}/">
<title>Starting {service}</title>
</head>
<body>
<p>Starting <strong>{service}</strong>. This page reloads once the sandbox is up.</p>
</body>
</html>
"#
    ))
}

fn parse_uuid(value: &str) -> LazyboxResult<Uuid> {
    value
        .parse()
        .map_err(|_| LazyboxError::Validation(format!("invalid uuid: {value}")))
}

fn rejection(e: JsonRejection) -> LazyboxError {
    LazyboxError::Validation(e.body_text())
}
