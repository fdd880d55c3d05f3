//! Shared HTTP plumbing for the GitHub clients.

use catapult_core::RemoteError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;

pub(crate) const DEFAULT_API_BASE: &str = "https://api.github.com";
pub(crate) const USER_AGENT: &str = concat!("catapult/", env!("CARGO_PKG_VERSION"));

/// Client-side ceiling; the server rejects anything bigger anyway.
pub(crate) const UPLOAD_LIMIT_BYTES: u64 = 100 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_http(token: &str) -> Result<Client, RemoteError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
    let bearer = format!("Bearer {token}");
    let mut auth = HeaderValue::from_str(&bearer)
        .map_err(|e| RemoteError::transport(format!("invalid token: {e}")))?;
    auth.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth);

    Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| RemoteError::transport(e.to_string()))
}

pub(crate) fn transport(e: reqwest::Error) -> RemoteError {
    RemoteError::transport(e.to_string())
}

/// What the failed request was operating on; decides how ambiguous status
/// codes are classified.
pub(crate) enum ErrorScope<'a> {
    Repository,
    File { path: &'a str, size: u64 },
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: Option<String>,
}

/// Pull the server's message out of an error response and classify it.
pub(crate) async fn error_from_response(resp: Response, scope: ErrorScope<'_>) -> RemoteError {
    let status = resp.status();
    let message = match resp.json::<ApiMessage>().await {
        Ok(body) => body.message.unwrap_or_else(|| status.to_string()),
        Err(_) => status.to_string(),
    };
    map_status(status, scope, message)
}

pub(crate) fn map_status(status: StatusCode, scope: ErrorScope<'_>, message: String) -> RemoteError {
    match status.as_u16() {
        403 if !message.to_lowercase().contains("rate limit") => {
            RemoteError::Permission { message }
        }
        404 => match scope {
            ErrorScope::Repository => RemoteError::Repository { message },
            ErrorScope::File { .. } => RemoteError::Api { status: 404, message },
        },
        413 => match scope {
            ErrorScope::File { path, size } => RemoteError::FileTooLarge {
                path: path.to_string(),
                size,
                limit: UPLOAD_LIMIT_BYTES,
            },
            ErrorScope::Repository => RemoteError::Api { status: 413, message },
        },
        422 => match scope {
            ErrorScope::File { path, size } if message.to_lowercase().contains("too large") => {
                RemoteError::FileTooLarge {
                    path: path.to_string(),
                    size,
                    limit: UPLOAD_LIMIT_BYTES,
                }
            }
            ErrorScope::File { path, .. } => RemoteError::Validation {
                path: path.to_string(),
                message,
            },
            ErrorScope::Repository => RemoteError::Api { status: 422, message },
        },
        code => RemoteError::Api { status: code, message },
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

/// The authenticated user's login; repository paths hang off it.
pub(crate) async fn fetch_login(http: &Client, api_base: &str) -> Result<String, RemoteError> {
    let resp = http
        .get(format!("{api_base}/user"))
        .send()
        .await
        .map_err(transport)?;
    if !resp.status().is_success() {
        return Err(error_from_response(resp, ErrorScope::Repository).await);
    }
    let user: UserResponse = resp.json().await.map_err(transport)?;
    Ok(user.login)
}
