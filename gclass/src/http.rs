//! Shared reqwest plumbing for the Google clients.

use gclass_core::contract::{ApiError, ServiceError};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Redirects are disabled: Drive answers upload chunks with `308 Resume
/// Incomplete`, which must reach the caller untouched.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("gclass/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub(crate) fn transport(e: reqwest::Error) -> ServiceError {
    ServiceError::Transport(e.to_string())
}

/// Turns a non-2xx response into [`ServiceError::Api`].
pub(crate) async fn error_for_status(resp: Response) -> Result<Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(api_error(resp).await.into())
}

pub(crate) async fn api_error(resp: Response) -> ApiError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    ApiError::from_response(status, &body)
}

pub(crate) async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ServiceError> {
    let resp = error_for_status(resp).await?;
    let text = resp.text().await.map_err(transport)?;
    serde_json::from_str(&text).map_err(|e| ServiceError::Decode(format!("{e}: {}", snippet(&text))))
}

fn snippet(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
