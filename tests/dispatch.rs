use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use tool_orchestrator::{
    builtin_registry, execute_code_tool, search_web_tool, CodeExecutionWorker, Deadline,
    DispatchConfig, Dispatcher, FailureKind, SearchWorker, SubprocessWorker, ToolCallRequest,
    ToolHandler, ToolRegistry, ValidatedInput, WorkerEndpoint, WorkerError,
};

// --- Fake workers ---

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn closed_port() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn fake_search(State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>) -> Json<Value> {
    hits.fetch_add(1, Ordering::SeqCst);
    let query = body["query"].as_str().unwrap_or_default();
    let answer = if query.contains("France") { "Paris" } else { "" };
    Json(json!({
        "answer": answer,
        "results": [
            {"title": "Paris - Wikipedia", "url": "https://en.wikipedia.org/wiki/Paris", "content": "Paris is the capital and largest city of France."},
            {"title": "France", "url": "https://en.wikipedia.org/wiki/France", "content": "France is a country in Western Europe."}
        ],
        "response_time": 0.42
    }))
}

async fn fake_execute(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({
        "code": "print(sum(range(101)))",
        "stdout": "5050\n",
        "stderr": format!("ran as {}", body["language"].as_str().unwrap_or("?")),
        "exit_code": 0,
        "task_echo": body["task"]
    }))
}

struct Stack {
    dispatcher: Dispatcher,
    search_hits: Arc<AtomicUsize>,
}

async fn healthy_stack() -> Stack {
    let search_hits = Arc::new(AtomicUsize::new(0));
    let search_url = serve(
        Router::new()
            .route("/search", post(fake_search))
            .with_state(search_hits.clone()),
    )
    .await;
    let code_url = serve(Router::new().route("/execute", post(fake_execute))).await;

    let registry = builtin_registry(
        SearchWorker::new(WorkerEndpoint::new(search_url).with_api_key("test-key")),
        CodeExecutionWorker::new(WorkerEndpoint::new(code_url)),
    )
    .unwrap();

    Stack {
        dispatcher: Dispatcher::new(registry, DispatchConfig::default()),
        search_hits,
    }
}

// --- Scenarios ---

#[tokio::test]
async fn search_returns_results() {
    let stack = healthy_stack().await;
    let result = stack
        .dispatcher
        .dispatch(&ToolCallRequest::new("searchWeb", json!({"query": "capital of France"})))
        .await;

    assert!(result.is_success(), "{result:?}");
    let payload = result.payload().unwrap();
    assert_eq!(payload["query"], "capital of France");
    assert_eq!(payload["answer"], "Paris");
    let results = payload["results"].as_array().unwrap();
    assert!(!results.is_empty());
    for r in results {
        assert!(r["title"].is_string());
        assert!(r["url"].is_string());
        assert!(r["snippet"].is_string());
    }
    assert!(payload.get("response_time").is_none());
}

#[tokio::test]
async fn search_without_query_never_reaches_worker() {
    let stack = healthy_stack().await;
    let result = stack
        .dispatcher
        .dispatch(&ToolCallRequest::new("searchWeb", json!({})))
        .await;

    assert_eq!(result.failure_kind(), Some(FailureKind::ValidationError));
    assert!(result.detail().unwrap().contains("query"));
    assert_eq!(stack.search_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_tool_is_reported() {
    let stack = healthy_stack().await;
    let result = stack
        .dispatcher
        .dispatch(&ToolCallRequest::new("unknownTool", json!({})))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::UnknownTool));
    assert_eq!(stack.search_hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn code_execution_returns_output() {
    let stack = healthy_stack().await;
    let result = stack
        .dispatcher
        .dispatch(&ToolCallRequest::new("executeCode", json!({"task": "sum 1..100"})))
        .await;

    let payload = result.payload().unwrap();
    assert_eq!(payload["stdout"], "5050\n");
    assert_eq!(payload["exit_code"], 0);
    assert_eq!(payload["task"], "sum 1..100");
    assert_eq!(payload["stderr"], "ran as python");
}

#[tokio::test]
async fn requested_language_reaches_code_worker() {
    let stack = healthy_stack().await;
    let result = stack
        .dispatcher
        .dispatch(&ToolCallRequest::new(
            "executeCode",
            json!({"task": "sum 1..100", "language": "javascript"}),
        ))
        .await;

    assert_eq!(result.payload().unwrap()["stderr"], "ran as javascript");
}

#[tokio::test]
async fn corrected_retry_succeeds_after_validation_error() {
    let stack = healthy_stack().await;
    let first = ToolCallRequest::new("searchWeb", json!({"q": "capital of France"}));
    let rejected = stack.dispatcher.dispatch(&first).await;
    assert_eq!(rejected.failure_kind(), Some(FailureKind::ValidationError));
    assert!(rejected.failure_kind().unwrap().is_retryable());

    let retried = first.retry_with(json!({"query": "capital of France"}));
    let result = stack.dispatcher.dispatch(&retried).await;
    assert!(result.is_success());
    assert_eq!(result.call_id, first.id);
}

#[tokio::test]
async fn unreachable_worker_is_unavailable() {
    let registry = ToolRegistry::new()
        .with(search_web_tool(
            SearchWorker::new(WorkerEndpoint::new(closed_port().await)).with_api_key("k"),
        ))
        .unwrap();
    let dispatcher = Dispatcher::new(registry, DispatchConfig::default());

    let result = dispatcher
        .dispatch(&ToolCallRequest::new("searchWeb", json!({"query": "q"})))
        .await;
    assert_eq!(result.failure_kind(), Some(FailureKind::WorkerUnavailable));
    assert!(!result.failure_kind().unwrap().is_retryable());
}

#[tokio::test]
async fn unresponsive_worker_times_out_promptly() {
    let url = serve(Router::new().route(
        "/execute",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Json(json!({}))
        }),
    ))
    .await;
    let registry = ToolRegistry::new()
        .with(execute_code_tool(CodeExecutionWorker::new(WorkerEndpoint::new(url))))
        .unwrap();
    let config = DispatchConfig::default().with_compute_timeout(Duration::from_millis(300));
    let dispatcher = Dispatcher::new(registry, config);

    let started = Instant::now();
    let result = dispatcher
        .dispatch(&ToolCallRequest::new("executeCode", json!({"task": "loop forever"})))
        .await;

    assert_eq!(result.failure_kind(), Some(FailureKind::WorkerTimeout));
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[cfg(unix)]
#[tokio::test]
async fn overrunning_subprocess_worker_is_cut_off() {
    let worker = SubprocessWorker::new("sh").with_args(["-c", "sleep 30"]);
    let registry = ToolRegistry::new()
        .with(execute_code_tool(worker).with_timeout(Duration::from_millis(300)))
        .unwrap();
    let dispatcher = Dispatcher::new(registry, DispatchConfig::default());

    let started = Instant::now();
    let result = dispatcher
        .dispatch(&ToolCallRequest::new("executeCode", json!({"task": "x".repeat(300_000)})))
        .await;

    assert_eq!(result.failure_kind(), Some(FailureKind::WorkerTimeout));
    assert!(started.elapsed() < Duration::from_secs(2), "took {:?}", started.elapsed());
}

#[cfg(unix)]
#[tokio::test]
async fn subprocess_worker_echoes_large_input() {
    let registry = ToolRegistry::new()
        .with(execute_code_tool(SubprocessWorker::new("cat")).with_timeout(Duration::from_secs(10)))
        .unwrap();
    let dispatcher = Dispatcher::new(registry, DispatchConfig::default());

    let task = "x".repeat(300_000);
    let result = dispatcher
        .dispatch(&ToolCallRequest::new("executeCode", json!({ "task": task })))
        .await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.payload().unwrap()["task"].as_str().map(str::len), Some(300_000));
}

// --- Concurrency ---

struct Sleeper(Duration);

#[async_trait]
impl ToolHandler for Sleeper {
    async fn invoke(&self, _input: ValidatedInput, _deadline: Deadline) -> Result<Value, WorkerError> {
        tokio::time::sleep(self.0).await;
        Ok(json!({"results": ["done"]}))
    }
}

#[tokio::test(start_paused = true)]
async fn fast_result_arrives_before_slow_one() {
    let registry = ToolRegistry::new()
        .with(execute_code_tool(Sleeper(Duration::from_secs(3))))
        .and_then(|r| r.with(search_web_tool(Sleeper(Duration::ZERO))))
        .unwrap();
    let dispatcher = Arc::new(Dispatcher::new(registry, DispatchConfig::default()));

    let (tx, mut rx) = tokio::sync::mpsc::channel(2);
    for (tool, args) in [
        ("executeCode", json!({"task": "slow"})),
        ("searchWeb", json!({"query": "fast"})),
    ] {
        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = dispatcher.dispatch(&ToolCallRequest::new(tool, args)).await;
            tx.send(result).await.unwrap();
        });
    }

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.tool_name, "searchWeb");
    assert_eq!(second.tool_name, "executeCode");
    assert!(first.is_success() && second.is_success());
}

#[tokio::test(start_paused = true)]
async fn aborted_turn_cancels_every_call() {
    let registry = ToolRegistry::new()
        .with(execute_code_tool(Sleeper(Duration::from_secs(60))))
        .and_then(|r| r.with(search_web_tool(Sleeper(Duration::from_secs(10)))))
        .unwrap();
    let dispatcher = Dispatcher::new(registry, DispatchConfig::default());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let requests = vec![
        ToolCallRequest::new("executeCode", json!({"task": "t"})),
        ToolCallRequest::new("searchWeb", json!({"query": "q"})),
        ToolCallRequest::new("searchWeb", json!({})),
    ];
    let results = dispatcher.dispatch_all(&requests, &cancel).await;

    assert_eq!(results[0].failure_kind(), Some(FailureKind::Cancelled));
    assert_eq!(results[1].failure_kind(), Some(FailureKind::Cancelled));
    assert_eq!(results[2].failure_kind(), Some(FailureKind::ValidationError));
}
