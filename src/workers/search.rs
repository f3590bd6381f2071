use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{HttpWorkerClient, WorkerEndpoint};
use crate::error::{ConfigError, WorkerError};
use crate::schema::ValidatedInput;
use crate::tools::ToolHandler;
use crate::types::Deadline;

const DEFAULT_MAX_RESULTS: u32 = 5;
const MAX_RESULTS_CAP: u32 = 20;

/// Web search worker. Sends `{query, max_results}` to `{base_url}/search`
/// and collapses the response into `{query, answer?, results: [{title, url, snippet}]}`.
#[derive(Debug, Clone)]
pub struct SearchWorker {
    http: HttpWorkerClient,
    max_results: u32,
}

impl SearchWorker {
    pub fn new(endpoint: WorkerEndpoint) -> Self {
        Self {
            http: HttpWorkerClient::new(endpoint),
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    /// Reads `SEARCH_WORKER_URL` and `SEARCH_WORKER_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(WorkerEndpoint::from_env("SEARCH_WORKER")?))
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = self.http.with_client(client);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.http = self.http.with_base_url(base_url);
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.http = self.http.with_api_key(api_key);
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results.clamp(1, MAX_RESULTS_CAP);
        self
    }

    /// Requested result count, clamped to `1..=20`. Absent means the worker default.
    fn limit(&self, requested: Option<i64>) -> u32 {
        requested
            .map(|n| n.clamp(1, i64::from(MAX_RESULTS_CAP)) as u32)
            .unwrap_or(self.max_results)
    }

    /// Flatten the backend's response. Accepts `results` or `items` arrays and
    /// the common spellings of each hit's fields; hits without a URL are dropped.
    fn normalize(query: &str, raw: &Value, limit: usize) -> Value {
        let hits = raw
            .get("results")
            .or_else(|| raw.get("items"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let results: Vec<Value> = hits
            .iter()
            .filter_map(|hit| {
                let url = first_str(hit, &["url", "link"])?;
                Some(json!({
                    "title": first_str(hit, &["title", "name"]).unwrap_or(url),
                    "url": url,
                    "snippet": first_str(hit, &["snippet", "content", "description"]).unwrap_or(""),
                }))
            })
            .take(limit)
            .collect();

        let mut out = json!({ "query": query, "results": results });
        if let Some(answer) = raw.get("answer").and_then(Value::as_str) {
            if !answer.is_empty() {
                out["answer"] = Value::String(answer.to_string());
            }
        }
        out
    }
}

#[derive(Deserialize)]
struct SearchInput {
    query: String,
    max_results: Option<i64>,
}

fn first_str<'a>(v: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl ToolHandler for SearchWorker {
    async fn invoke(&self, input: ValidatedInput, deadline: Deadline) -> Result<Value, WorkerError> {
        let SearchInput { query, max_results } = input
            .deserialize()
            .map_err(|e| WorkerError::Failed(format!("invalid search input: {e}")))?;

        if !self.http.has_api_key() {
            return Err(WorkerError::Unavailable(
                "search worker API key is not configured (SEARCH_WORKER_API_KEY)".into(),
            ));
        }

        let limit = self.limit(max_results);

        let raw = self
            .http
            .post_json(
                "/search",
                &json!({ "query": query, "max_results": limit }),
                deadline,
            )
            .await?;

        Ok(Self::normalize(&query, &raw, limit as usize))
    }
}
