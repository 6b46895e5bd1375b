use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::error::{ClientError, ClientResult};

/// One outbound request, relative to the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// How a response was classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// 2xx with a JSON body.
    Payload(Value),
    /// 204, or 2xx with no body.
    Empty,
    /// Any non-2xx status. `message` is the body's `message` field, if any.
    Failure {
        status: u16,
        reason: String,
        message: Option<String>,
    },
}

impl Outcome {
    pub fn classify(status: StatusCode, body: &[u8]) -> ClientResult<Self> {
        if status.is_success() {
            if status == StatusCode::NO_CONTENT || body.iter().all(u8::is_ascii_whitespace) {
                return Ok(Self::Empty);
            }
            return serde_json::from_slice(body)
                .map(Self::Payload)
                .map_err(|e| ClientError::Transport(format!("malformed response: {}", e)));
        }

        let message = serde_json::from_slice::<Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .filter(|m| !m.trim().is_empty());

        Ok(Self::Failure {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            message,
        })
    }

    /// "404 Not Found" style line used when the server sent no message.
    pub fn status_line(status: u16, reason: &str) -> String {
        format!("{} {}", status, reason).trim_end().to_string()
    }
}

/// Performs one request/response exchange. Holds no session state.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> ClientResult<Outcome>;
}

#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    http: Client,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> ClientResult<Outcome> {
        let url = self.resolve(&request.path);
        let mut req = self
            .http
            .request(request.method.clone(), &url)
            .header(ACCEPT, "application/json");

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }
        if let Some(ref body) = request.body {
            req = req.header(CONTENT_TYPE, "application/json").json(body);
        }
        if let Some(ref token) = request.bearer {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(|e| {
            log::warn!("{} {} failed: {}", request.method, request.path, e);
            ClientError::Transport(e.to_string())
        })?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(format!("failed to read response: {}", e)))?;

        log::debug!("{} {} -> {}", request.method, request.path, status);
        Outcome::classify(status, &body)
    }
}
