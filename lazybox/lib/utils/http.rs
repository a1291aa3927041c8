use std::time::Duration;

use reqwest::{redirect, Client, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

use crate::{LazyboxError, LazyboxResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Builds a client for collaborator APIs.
///
/// `timeout` bounds both connecting and the whole request. With `max_retries > 0` transient
/// failures are retried with exponential backoff.
pub fn build_collaborator_client(
    timeout: Duration,
    max_retries: u32,
) -> LazyboxResult<ClientWithMiddleware> {
    let client = Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()?;

    let client_builder = ClientBuilder::new(client);
    let client = if max_retries > 0 {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        client_builder
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    } else {
        client_builder.build()
    };

    Ok(client)
}

/// Builds the client used to forward requests to sandboxes.
///
/// Redirects are passed back to the caller, not followed, and nothing is retried.
pub fn build_forward_client(timeout: Duration) -> LazyboxResult<Client> {
    Ok(Client::builder()
        .connect_timeout(timeout)
        .timeout(timeout)
        .redirect(redirect::Policy::none())
        .build()?)
}

/// Passes a successful response through and turns anything else into an upstream error.
pub async fn check_status(response: Response, context: &str) -> LazyboxResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(LazyboxError::Upstream(format!(
        "{context} returned {status}: {body}"
    )))
}
