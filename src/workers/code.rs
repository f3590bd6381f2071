use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{HttpWorkerClient, WorkerEndpoint};
use crate::error::{ConfigError, WorkerError};
use crate::schema::ValidatedInput;
use crate::tools::ToolHandler;
use crate::types::Deadline;

/// Code-execution worker. The backend turns a task description into code,
/// runs it in its sandbox and reports what happened.
///
/// A non-zero exit code is still a successful call: the code ran and the
/// model gets to see stderr.
#[derive(Debug, Clone)]
pub struct CodeExecutionWorker {
    http: HttpWorkerClient,
    language: String,
}

#[derive(Deserialize)]
struct ExecuteInput {
    task: String,
    language: Option<String>,
}

#[derive(Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default, alias = "output")]
    stdout: String,
    #[serde(default)]
    stderr: String,
    #[serde(default)]
    exit_code: i64,
}

impl CodeExecutionWorker {
    pub fn new(endpoint: WorkerEndpoint) -> Self {
        Self {
            http: HttpWorkerClient::new(endpoint),
            language: "python".into(),
        }
    }

    /// Reads `CODE_WORKER_URL` and the optional `CODE_WORKER_API_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(WorkerEndpoint::from_env("CODE_WORKER")?))
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

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[async_trait]
impl ToolHandler for CodeExecutionWorker {
    async fn invoke(&self, input: ValidatedInput, deadline: Deadline) -> Result<Value, WorkerError> {
        let ExecuteInput { task, language } = input
            .deserialize()
            .map_err(|e| WorkerError::Failed(format!("invalid execute input: {e}")))?;
        let language = language.as_deref().unwrap_or(&self.language);

        let raw = self
            .http
            .post_json(
                "/execute",
                &json!({ "task": task, "language": language }),
                deadline,
            )
            .await?;

        let resp: ExecuteResponse = serde_json::from_value(raw)
            .map_err(|e| WorkerError::Failed(format!("unexpected execute response: {e}")))?;

        let mut out = json!({
            "task": task,
            "stdout": resp.stdout,
            "stderr": resp.stderr,
            "exit_code": resp.exit_code,
        });
        if let Some(code) = resp.code {
            out["code"] = Value::String(code);
        }
        Ok(out)
    }
}
