pub mod middleware;

use reqwest::Client;
use reqwest_middleware::ClientBuilder;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;

/// Error envelope returned by the Identity Toolkit and secure token APIs.
#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorDetails,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
    pub errors: Option<Vec<FirebaseSubError>>,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseSubError {
    pub message: String,
    pub domain: Option<String>,
    pub reason: Option<String>,
}

impl FirebaseErrorResponse {
    pub fn display_message(&self) -> String {
        format!("{} (code: {})", self.error.message, self.error.code)
    }
}

/// Error envelope returned by the Realtime Database REST API, e.g. `{"error": "Permission denied"}`.
#[derive(Debug, Deserialize)]
struct DatabaseErrorResponse {
    error: String,
}

/// Extracts a readable message from either backend's error body.
pub fn error_message_from_body(body: &str) -> Option<String> {
    if let Ok(detailed) = serde_json::from_str::<FirebaseErrorResponse>(body) {
        return Some(detailed.display_message());
    }
    serde_json::from_str::<DatabaseErrorResponse>(body)
        .ok()
        .map(|plain| plain.error)
}

pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match error_message_from_body(&body) {
        Some(message) => message,
        None => format!("{}: {}", default_msg, status),
    }
}

/// Starts a middleware client, optionally retrying transient failures.
///
/// With `max_retries == 0` no retry layer is installed and each call is sent exactly once.
pub(crate) fn client_builder(max_retries: u32) -> ClientBuilder {
    let builder = ClientBuilder::new(Client::new());
    if max_retries == 0 {
        return builder;
    }
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
    builder.with(RetryTransientMiddleware::new_with_policy(retry_policy))
}
