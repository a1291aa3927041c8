use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    lifecycle::{IdleCheckOutcome, ProvisionInput},
    models::SandboxRecord,
    LazyboxError, LazyboxResult,
};

//--------------------------------------------------------------------------------------------------
// Types: Requests
//--------------------------------------------------------------------------------------------------

/// Request body for provisioning a sandbox
///
/// Every field is required. They are optional here so a missing one is reported as a
/// validation error naming the field.
#[derive(Debug, Default, Deserialize)]
pub struct ProvisionRequest {
    /// The repository name
    pub repository: Option<String>,

    /// The user handle
    pub user: Option<String>,

    /// The pull-request number
    pub pr: Option<u64>,

    /// The requester id
    pub created_by_user_id: Option<u64>,
}

/// Request body for starting a sandbox
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// The sandbox to start
    pub service_uuid: Option<Uuid>,
}

/// Request body for an idle-check
#[derive(Debug, Deserialize)]
pub struct IdleCheckRequest {
    /// The sandbox to check
    pub service_uuid: Option<Uuid>,

    /// Go idle regardless of recent traffic
    #[serde(default)]
    pub force_shutdown: bool,
}

//--------------------------------------------------------------------------------------------------
// Types: Responses
//--------------------------------------------------------------------------------------------------

/// Response type for status requests
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Message indicating the status of the operation
    pub message: String,
}

/// Response body for a start
#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    /// The started sandbox
    pub service_uuid: Uuid,

    /// When the next idle-check fires
    pub next_check_at: DateTime<Utc>,
}

/// Response body for an idle-check
#[derive(Debug, Serialize, Deserialize)]
pub struct IdleCheckResponse {
    /// The checked sandbox
    pub service_uuid: Uuid,

    /// What the check decided
    #[serde(flatten)]
    pub outcome: IdleCheckOutcome,
}

/// Response body for listing sandboxes
#[derive(Debug, Serialize, Deserialize)]
pub struct SandboxListResponse {
    /// All sandboxes, oldest first
    pub sandboxes: Vec<SandboxRecord>,
}

//--------------------------------------------------------------------------------------------------
// Types: Error Response
//--------------------------------------------------------------------------------------------------

/// Standard error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status code
    pub code: u16,

    /// Error message
    pub message: String,

    /// Error type for categorizing errors
    pub error_type: ErrorType,

    /// Optional additional details about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Types of errors that can occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Invalid request parameters, body or host
    ValidationError,

    /// Resource not found
    NotFound,

    /// The request method cannot be forwarded
    MethodNotAllowed,

    /// The resource already exists
    Conflict,

    /// Internal server errors
    InternalError,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ProvisionRequest {
    /// Checks that every field is present.
    pub fn into_input(self) -> LazyboxResult<ProvisionInput> {
        Ok(ProvisionInput {
            repository: required("repository", self.repository)?,
            user: required("user", self.user)?,
            pr: required("pr", self.pr)?,
            created_by_user_id: required("created_by_user_id", self.created_by_user_id)?,
        })
    }
}

impl StatusResponse {
    /// Create a new status response for a successful operation
    pub fn ok() -> Self {
        Self {
            message: "OK".to_string(),
        }
    }
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(code: u16, message: String, error_type: ErrorType) -> Self {
        Self {
            code,
            message,
            error_type,
            details: None,
        }
    }

    /// Add details to the error response, ignoring details for 500-level errors
    pub fn with_details(mut self, details: String) -> Self {
        // Only include details for non-500 errors
        if self.code < 500 {
            self.details = Some(details);
        }
        self
    }

    /// Maps an error to its status and response body.
    ///
    /// Server errors carry a generic message only.
    pub fn from_error(error: &LazyboxError) -> (StatusCode, Self) {
        let (status, error_type, message) = match error {
            LazyboxError::Validation(_) | LazyboxError::InvalidHost(_) => (
                StatusCode::BAD_REQUEST,
                ErrorType::ValidationError,
                "invalid request",
            ),
            LazyboxError::SandboxNotFound(_)
            | LazyboxError::ScheduleNotFound(_)
            | LazyboxError::DomainMismatch(_) => {
                (StatusCode::NOT_FOUND, ErrorType::NotFound, "not found")
            }
            LazyboxError::InvalidMethod(_) => (
                StatusCode::METHOD_NOT_ALLOWED,
                ErrorType::MethodNotAllowed,
                "method not allowed",
            ),
            LazyboxError::Conflict(_) => (StatusCode::CONFLICT, ErrorType::Conflict, "conflict"),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorType::InternalError,
                "internal server error",
            ),
        };

        let response = Self::new(status.as_u16(), message.to_string(), error_type)
            .with_details(error.to_string());

        (status, response)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn required<T>(field: &str, value: Option<T>) -> LazyboxResult<T> {
    value.ok_or_else(|| LazyboxError::Validation(format!("missing field: {field}")))
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl IntoResponse for LazyboxError {
    fn into_response(self) -> Response {
        let (status, body) = ErrorResponse::from_error(&self);
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        (status, Json(body)).into_response()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
