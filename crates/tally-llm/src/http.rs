// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP plumbing: client construction, request sending, and mapping
//! of failed responses onto [`TallyError`].

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tally_core::TallyError;
use tracing::debug;

use crate::wire::ApiErrorResponse;

/// Build a client that sends `auth_header: auth_value` on every request.
pub fn build_client(
    auth_header: &'static str,
    auth_value: &str,
    timeout: Duration,
) -> Result<reqwest::Client, TallyError> {
    let mut headers = HeaderMap::new();
    let mut value = HeaderValue::from_str(auth_value)
        .map_err(|e| TallyError::Config(format!("invalid API key header value: {e}")))?;
    value.set_sensitive(true);
    headers.insert(HeaderName::from_static(auth_header), value);
    headers.insert(
        "content-type",
        HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| TallyError::Provider {
            message: format!("failed to build HTTP client: {e}"),
            status: None,
            source: Some(Box::new(e)),
        })
}

/// POST `body` as JSON and return the response if its status is a success.
pub async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
    provider: &str,
    timeout: Duration,
) -> Result<reqwest::Response, TallyError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| send_error(e, timeout))?;

    let status = response.status();
    debug!(provider, status = %status, "provider response received");
    if status.is_success() {
        Ok(response)
    } else {
        Err(error_from_response(provider, response).await)
    }
}

/// Read and deserialize a successful response body.
pub async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    provider: &str,
) -> Result<T, TallyError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| TallyError::Network {
        message: format!("failed to read {provider} response body: {e}"),
        source: Some(Box::new(e)),
    })?;
    serde_json::from_str(&body).map_err(|e| TallyError::Provider {
        message: format!("failed to parse {provider} response: {e}"),
        status: Some(status),
        source: Some(Box::new(e)),
    })
}

fn send_error(e: reqwest::Error, timeout: Duration) -> TallyError {
    if e.is_timeout() {
        TallyError::Timeout { duration: timeout }
    } else {
        TallyError::Network {
            message: format!("HTTP request failed: {}", e.without_url()),
            source: None,
        }
    }
}

/// Turn a non-success response into the matching error variant.
pub async fn error_from_response(provider: &str, response: reqwest::Response) -> TallyError {
    let status = response.status();
    let retry_after = retry_after(response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(api_err) => match api_err.error.kind {
            Some(kind) => format!("{provider} API error ({kind}): {}", api_err.error.message),
            None => format!("{provider} API error: {}", api_err.error.message),
        },
        Err(_) => format!("{provider} returned {status}: {body}"),
    };

    if status == StatusCode::TOO_MANY_REQUESTS {
        TallyError::RateLimited {
            message,
            retry_after,
        }
    } else {
        TallyError::provider(message, Some(status.as_u16()))
    }
}

/// `Retry-After` in whole seconds. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
