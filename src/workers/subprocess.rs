use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::WorkerError;
use crate::schema::ValidatedInput;
use crate::tools::ToolHandler;
use crate::types::Deadline;

const MAX_STDERR: usize = 2000;

/// Runs a local program per call. The validated input is written to stdin
/// as JSON; stdout is parsed as JSON, or wrapped as `{"output": "..."}` when
/// it is plain text.
///
/// The child is killed if the call is abandoned (deadline, cancellation).
#[derive(Debug, Clone)]
pub struct SubprocessWorker {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    working_dir: Option<PathBuf>,
}

impl SubprocessWorker {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl ToolHandler for SubprocessWorker {
    async fn invoke(&self, input: ValidatedInput, deadline: Deadline) -> Result<Value, WorkerError> {
        let budget = deadline.remaining();
        if budget.is_zero() {
            return Err(WorkerError::Timeout(Duration::ZERO));
        }

        let mut child = self.command().spawn().map_err(|e| {
            WorkerError::Unavailable(format!("failed to spawn {}: {e}", self.program.display()))
        })?;
        debug!(program = %self.program.display(), pid = ?child.id(), "worker process started");

        let payload = serde_json::to_vec(input.as_map())
            .map_err(|e| WorkerError::Failed(format!("failed to encode input: {e}")))?;

        // Feed stdin while draining stdout, or a chatty child fills its pipe
        // and both sides block.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(&payload).await {
                // A program that ignores stdin may exit before reading it.
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    Err(WorkerError::Failed(format!("failed to write input: {e}")))
                }
                _ => Ok(()),
            }
        };
        let run = async {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output.map_err(|e| WorkerError::Failed(format!("failed to collect output: {e}")))
        };

        let output = tokio::time::timeout_at(deadline.instant(), run)
            .await
            .map_err(|_| WorkerError::Timeout(budget))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR).collect();
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(WorkerError::Failed(format!("exit status {code}: {stderr}")));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let trimmed = stdout.trim();
        Ok(serde_json::from_str(trimmed).unwrap_or_else(|_| json!({ "output": trimmed })))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::schema::{FieldType, InputSchema};

    fn input(task: &str) -> ValidatedInput {
        InputSchema::new()
            .required("task", FieldType::String, "")
            .validate(&json!({ "task": task }))
            .unwrap()
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(5))
    }

    fn sh(script: &str) -> SubprocessWorker {
        SubprocessWorker::new("sh").with_args(["-c", script])
    }

    #[tokio::test]
    async fn json_stdout_is_the_payload() {
        let out = sh("cat").invoke(input("echo me"), deadline()).await.unwrap();
        assert_eq!(out, json!({"task": "echo me"}));
    }

    #[tokio::test]
    async fn plain_stdout_is_wrapped() {
        let out = sh("echo hello").invoke(input("x"), deadline()).await.unwrap();
        assert_eq!(out, json!({"output": "hello"}));
    }

    #[tokio::test]
    async fn env_is_passed_through() {
        let out = sh("echo $GREETING")
            .with_env("GREETING", "hi")
            .invoke(input("x"), deadline())
            .await
            .unwrap();
        assert_eq!(out["output"], "hi");
    }

    #[tokio::test]
    async fn nonzero_exit_is_worker_failure() {
        let err = sh("echo nope >&2; exit 3")
            .invoke(input("x"), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Failed(ref m) if m.contains("exit status 3") && m.contains("nope")));
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let err = SubprocessWorker::new("/nonexistent/worker-binary")
            .invoke(input("x"), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Unavailable(_)));
    }

    #[tokio::test]
    async fn large_input_echoed_back_does_not_deadlock() {
        let task = "x".repeat(300_000);
        let out = SubprocessWorker::new("cat")
            .invoke(input(&task), Deadline::after(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(out["task"].as_str().map(str::len), Some(300_000));
    }

    #[tokio::test]
    async fn child_that_never_reads_stdin_still_times_out() {
        let started = std::time::Instant::now();
        let err = sh("sleep 10")
            .invoke(input(&"y".repeat(300_000)), Deadline::after(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn slow_process_times_out() {
        let started = std::time::Instant::now();
        let err = sh("sleep 10")
            .invoke(input("x"), Deadline::after(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
