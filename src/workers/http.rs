use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::WorkerEndpoint;
use crate::error::WorkerError;
use crate::types::Deadline;

/// Longest slice of an error body quoted back in a `WorkerError`.
const MAX_ERROR_BODY: usize = 500;

/// JSON-over-HTTP transport shared by the HTTP worker adapters.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpWorkerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpWorkerClient {
    pub fn new(endpoint: WorkerEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: endpoint.base_url,
            api_key: endpoint.api_key,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// POST `body` to `{base_url}{path}` and return the parsed JSON response.
    ///
    /// The request timeout is whatever is left of `deadline`. A response
    /// body carrying a non-null `error` field counts as a worker failure.
    pub async fn post_json(
        &self,
        path: &str,
        body: &Value,
        deadline: Deadline,
    ) -> Result<Value, WorkerError> {
        let remaining = deadline.remaining();
        if remaining.is_zero() {
            return Err(WorkerError::Timeout(Duration::ZERO));
        }

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, timeout_ms = remaining.as_millis() as u64, "worker request");

        let mut req = self
            .client
            .post(&url)
            .timeout(remaining)
            .header("content-type", "application/json")
            .json(body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| classify_send_error(&e, remaining))?;

        let status = resp.status().as_u16();
        let text = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                WorkerError::Timeout(remaining)
            } else {
                WorkerError::Failed(format!("failed to read response: {e}"))
            }
        })?;

        if !(200..300).contains(&status) {
            return Err(classify_status(status, &text, remaining));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| WorkerError::Failed(format!("failed to parse response: {e}")))?;

        match parsed.get("error") {
            None | Some(Value::Null) => Ok(parsed),
            Some(Value::String(msg)) => Err(WorkerError::Failed(msg.clone())),
            Some(other) => Err(WorkerError::Failed(other.to_string())),
        }
    }
}

fn classify_send_error(e: &reqwest::Error, budget: Duration) -> WorkerError {
    if e.is_timeout() {
        WorkerError::Timeout(budget)
    } else {
        WorkerError::Unavailable(format!("request failed: {e}"))
    }
}

/// Auth, routing and gateway errors mean the request never reached a
/// working worker. Everything else was reported by the worker itself.
fn classify_status(status: u16, body: &str, budget: Duration) -> WorkerError {
    let body = truncate(body, MAX_ERROR_BODY);
    match status {
        401 | 403 | 404 | 502 | 503 => {
            WorkerError::Unavailable(format!("worker returned {status}: {body}"))
        }
        408 | 504 => WorkerError::Timeout(budget),
        _ => WorkerError::Failed(format!("worker returned {status}: {body}")),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
