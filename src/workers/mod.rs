//! Worker adapters: one `ToolHandler` per external capability.
//!
//! Each adapter derives its transport timeout from the call's `Deadline` and
//! reports failures as `WorkerError`, keeping connectivity and configuration
//! faults (`Unavailable`) apart from failures the worker itself reported
//! (`Failed`).

pub mod code;
pub mod http;
pub mod search;
pub mod subprocess;

use crate::error::ConfigError;

pub use code::CodeExecutionWorker;
pub use http::HttpWorkerClient;
pub use search::SearchWorker;
pub use subprocess::SubprocessWorker;

/// Where a worker lives. Read from `{PREFIX}_URL` and `{PREFIX}_API_KEY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl WorkerEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Load from the process environment, e.g. `SEARCH_WORKER_URL`.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup. A missing API key is not an
    /// error here; it surfaces per call as `WorkerUnavailable`.
    pub fn from_lookup(
        prefix: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let url_var = format!("{prefix}_URL");
        let base_url = lookup(&url_var)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar(url_var.clone()))?;

        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: url_var,
                reason: format!("expected an http(s) URL, got '{base_url}'"),
            });
        }

        let api_key = lookup(&format!("{prefix}_API_KEY")).filter(|v| !v.trim().is_empty());

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::Router;

    /// Serve `app` on an ephemeral local port and return its base URL.
    pub async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// A local URL nothing is listening on.
    pub async fn closed_port() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }
}
