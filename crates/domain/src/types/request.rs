//! Outbound request description and dispatch outcomes

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP verbs the governor knows how to dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound call against the provider API.
///
/// The queue treats this as opaque; only the transport interprets it. The
/// `path` is relative to the transport's configured base URL.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Logical API name used for call logging (e.g. "strava")
    pub api: String,
    pub method: HttpMethod,
    pub path: String,
    #[serde(default)]
    pub query: Vec<(String, String)>,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    /// Per-owner credential supplied by the caller; never refreshed here
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<String>,
}

impl RequestSpec {
    /// Create a request for the given method and path
    pub fn new(api: impl Into<String>, method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            bearer_token: None,
        }
    }

    /// Convenience constructor for GET requests
    pub fn get(api: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(api, HttpMethod::Get, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

// Manual Debug so credentials never end up in logs
impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("api", &self.api)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .field("body", &self.body.is_some())
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Raw result of handing a [`RequestSpec`] to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Success { status: u16, payload: serde_json::Value },
    /// Provider signalled "too many requests"
    RateLimited { status: u16, retry_after: Option<Duration>, message: String },
    /// Provider rejected the credential
    AuthError { status: u16, message: String },
    /// Anything else, including transport failures with no HTTP status
    OtherError { status: Option<u16>, message: String },
}

impl DispatchOutcome {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success { status, .. }
            | Self::RateLimited { status, .. }
            | Self::AuthError { status, .. } => Some(*status),
            Self::OtherError { status, .. } => *status,
        }
    }

    /// Error text for call logging, `None` on success
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::RateLimited { message, .. }
            | Self::AuthError { message, .. }
            | Self::OtherError { message, .. } => Some(message),
        }
    }
}

/// Successful result delivered back to whoever enqueued a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub status: u16,
    pub payload: serde_json::Value,
    /// Total dispatch attempts, including rate-limited ones
    pub attempts: u32,
}
