//! Provider transport over HTTP
//!
//! Maps HTTP responses onto [`DispatchOutcome`]: `429` is a rate limit,
//! `401`/`403` a rejected credential, any other non-2xx or network failure an
//! unclassified error.

use std::time::Duration;

use async_trait::async_trait;
use pacegate_core::Transport;
use pacegate_domain::{DispatchOutcome, HttpMethod, PaceGateError, ProviderConfig, RequestSpec};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::client::HttpClient;

/// Longest error body carried into an outcome message
const MAX_ERROR_BODY: usize = 256;

pub struct HttpTransport {
    client: HttpClient,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, PaceGateError> {
        Ok(Self::new(HttpClient::from_config(config)?, config.base_url.clone()))
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn dispatch(&self, request: &RequestSpec) -> DispatchOutcome {
        let mut builder = self.client.request(method_of(request.method), self.url(&request.path));
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match self.client.send(builder).await {
            Ok(response) => response,
            Err(err) => {
                return DispatchOutcome::OtherError { status: None, message: err.to_string() }
            }
        };

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return DispatchOutcome::OtherError {
                    status: Some(status.as_u16()),
                    message: format!("failed to read response body: {err}"),
                }
            }
        };

        classify_response(status, retry_after, &body)
    }
}

fn method_of(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

fn classify_response(status: StatusCode, retry_after: Option<Duration>, body: &str) -> DispatchOutcome {
    let code = status.as_u16();

    if status.is_success() {
        if body.trim().is_empty() {
            return DispatchOutcome::Success { status: code, payload: Value::Null };
        }
        return match serde_json::from_str(body) {
            Ok(payload) => DispatchOutcome::Success { status: code, payload },
            Err(err) => DispatchOutcome::OtherError {
                status: Some(code),
                message: format!("invalid JSON in response body: {err}"),
            },
        };
    }

    let message = error_message(status, body);
    debug!(status = code, %message, "provider returned an error status");
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            DispatchOutcome::RateLimited { status: code, retry_after, message }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            DispatchOutcome::AuthError { status: code, message }
        }
        _ => DispatchOutcome::OtherError { status: Some(code), message },
    }
}

/// Prefer the provider's `message` field, else a truncated raw body
fn error_message(status: StatusCode, body: &str) -> String {
    let reason = status.canonical_reason().unwrap_or("unknown status");
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().chars().take(MAX_ERROR_BODY).collect());

    if detail.is_empty() {
        format!("HTTP {} {}", status.as_u16(), reason)
    } else {
        format!("HTTP {} {}: {}", status.as_u16(), reason, detail)
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
