//! The raw request/response seam between the gateway and the network.
//!
//! [`Transport`] is the only thing that talks HTTP. The gateway layers rate
//! limiting and retries over any implementation; tests substitute a scripted
//! one.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reposync_core::ApiSettings;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
        }
    }
}

/// One hosting API call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// Short name of the logical operation, used in logs and errors.
    pub operation: &'static str,
    pub method: Method,
    /// Path below the API base URL, starting with `/`, already percent-encoded.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(operation: &'static str, path: impl Into<String>) -> Self {
        Self {
            operation,
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn with_body(operation: &'static str, method: Method, path: impl Into<String>, body: Value) -> Self {
        Self {
            operation,
            method,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }
}

/// A response with any status code. Header names are lower-cased.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    /// Parsed JSON body; `Null` when empty, a JSON string when not JSON.
    pub body: Value,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// The provider's `message` field, or the raw body.
    pub fn message(&self) -> String {
        match &self.body {
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| self.body.to_string()),
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// The request never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Non-2xx statuses are returned as `Ok`.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        (**self).send(request).await
    }
}

// ---------------------------------------------------------------------------
// ureq transport
// ---------------------------------------------------------------------------

/// Blocking `ureq` agent driven from `spawn_blocking`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: Arc<str>,
    token: Arc<str>,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UreqTransport {
    pub fn new(settings: &ApiSettings, token: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.request_timeout)
            .user_agent(concat!("reposync/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: Arc::from(settings.base_url.as_str()),
            token: Arc::from(token.into()),
        }
    }

    fn send_blocking(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut call = self
            .agent
            .request(request.method.as_str(), &url)
            .set("Authorization", &format!("Bearer {}", self.token))
            .set("Accept", "application/vnd.github+json")
            .set("X-GitHub-Api-Version", "2022-11-28");
        for (key, value) in &request.query {
            call = call.query(key, value);
        }

        let result = match &request.body {
            Some(body) => call.send_json(body),
            None => call.call(),
        };
        match result {
            Ok(response) | Err(ureq::Error::Status(_, response)) => read_response(response),
            Err(ureq::Error::Transport(err)) => {
                let message = err.to_string();
                if message.contains("timed out") {
                    Err(TransportError::Timeout)
                } else {
                    Err(TransportError::Network(message))
                }
            }
        }
    }
}

fn read_response(response: ureq::Response) -> Result<ApiResponse, TransportError> {
    let status = response.status();
    let headers = response
        .headers_names()
        .into_iter()
        .filter_map(|name| {
            let value = response.header(&name)?.to_owned();
            Some((name.to_ascii_lowercase(), value))
        })
        .collect();
    let text = response
        .into_string()
        .map_err(|e| TransportError::Network(format!("reading body: {e}")))?;
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    Ok(ApiResponse {
        status,
        headers,
        body,
    })
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let this = self.clone();
        let request = request.clone();
        tokio::task::spawn_blocking(move || this.send_blocking(&request))
            .await
            .map_err(|e| TransportError::Network(format!("transport task failed: {e}")))?
    }
}
