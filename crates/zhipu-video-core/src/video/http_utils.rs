//! HTTP utilities for the video API
//!
//! Common request/response handling for the JSON endpoints.

use crate::video::VideoError;
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Creates an HTTP client, optionally with a request timeout.
#[must_use]
pub fn create_http_client(timeout: Option<Duration>) -> HttpClient {
    let mut builder = HttpClient::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().unwrap_or_else(|_| HttpClient::new())
}

/// Sends a POST with a JSON body and parses the JSON response.
///
/// # Errors
///
/// Returns `VideoError::NetworkError` on connectivity issues, `VideoError::ApiError` on
/// non-success status codes, or `VideoError::JsonError` if parsing fails.
pub async fn post_json<T: DeserializeOwned>(
    client: &HttpClient,
    url: &str,
    body: &Value,
    bearer: &str,
) -> Result<T, VideoError> {
    send(client.post(url).json(body), bearer).await
}

/// Sends a GET and parses the JSON response.
///
/// # Errors
///
/// Same as [`post_json`].
pub async fn get_json<T: DeserializeOwned>(
    client: &HttpClient,
    url: &str,
    bearer: &str,
) -> Result<T, VideoError> {
    send(client.get(url), bearer).await
}

async fn send<T: DeserializeOwned>(request: RequestBuilder, bearer: &str) -> Result<T, VideoError> {
    let response = request
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| VideoError::NetworkError(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(VideoError::ApiError(describe_error(status, &error_text)));
    }

    response
        .json()
        .await
        .map_err(|e| VideoError::JsonError(e.to_string()))
}

/// Builds a readable message out of an error response body.
///
/// Zhipu errors look like `{"error": {"code": "1214", "message": "..."}}`;
/// anything else is passed through, truncated, and HTML error pages from
/// proxies are not echoed at all.
fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    let trimmed = body.trim_start();
    let is_html = trimmed.starts_with("<!DOCTYPE")
        || trimmed.starts_with("<html")
        || trimmed.starts_with("<HTML");
    if is_html {
        return format!("{status} (Server returned HTML error page)");
    }

    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let error = &json["error"];
        if let Some(message) = error["message"].as_str() {
            return match error["code"].as_str() {
                Some(code) => format!("{status} - [{code}] {message}"),
                None => format!("{status} - {message}"),
            };
        }
    }

    let text = crate::utils::truncate_str(body, MAX_ERROR_BODY_CHARS);
    if text.len() < body.len() {
        format!("{status} - {text}... (truncated)")
    } else {
        format!("{status} - {text}")
    }
}
