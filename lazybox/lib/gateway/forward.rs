use axum::{
    body::Body,
    http::{
        header::{self, HeaderMap, HeaderValue},
        Method, StatusCode,
    },
    response::Response,
};
use bytes::Bytes;

use crate::{models::Endpoint, LazyboxError, LazyboxResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Methods the gateway forwards.
pub const FORWARDABLE_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
];

/// The content type reported when the backend sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Connection-scoped headers that must not cross the proxy.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What the gateway keeps of a backend response.
#[derive(Debug, Clone)]
pub struct ForwardedResponse {
    /// The backend's status.
    pub status: StatusCode,

    /// The backend's content type, or [`DEFAULT_CONTENT_TYPE`].
    pub content_type: HeaderValue,

    /// Where a redirecting backend points to.
    pub location: Option<HeaderValue>,

    /// The full body.
    pub body: Bytes,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ForwardedResponse {
    /// Turns the forwarded response into the gateway's response.
    pub fn into_response(self) -> LazyboxResult<Response> {
        let mut builder = Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, self.content_type);

        if let Some(location) = self.location {
            builder = builder.header(header::LOCATION, location);
        }

        builder
            .body(Body::from(self.body))
            .map_err(LazyboxError::custom)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Checks that a request method can be forwarded.
pub fn check_method(method: &Method) -> LazyboxResult<()> {
    if FORWARDABLE_METHODS.contains(method) {
        return Ok(());
    }

    Err(LazyboxError::InvalidMethod(method.to_string()))
}

/// Copies request headers minus hop-by-hop ones and the content length, which the client
/// recomputes for the buffered body.
pub fn forward_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) || name == header::CONTENT_LENGTH {
            continue;
        }
        forwarded.append(name.clone(), value.clone());
    }

    forwarded
}

/// Sends a buffered request to a sandbox endpoint. Nothing is retried.
pub async fn forward(
    client: &reqwest::Client,
    endpoint: &Endpoint,
    method: Method,
    path_and_query: &str,
    headers: HeaderMap,
    body: Bytes,
) -> LazyboxResult<ForwardedResponse> {
    let url = format!("{}{path_and_query}", endpoint.base_url());
    tracing::debug!("forwarding {method} to {url}");

    let response = client
        .request(method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let location = status
        .is_redirection()
        .then(|| response.headers().get(header::LOCATION).cloned())
        .flatten();
    let body = response.bytes().await?;

    Ok(ForwardedResponse {
        status,
        content_type,
        location,
        body,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
