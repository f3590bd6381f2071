//! Dispatch a single tool call against the configured workers.
//!
//! Usage:
//!   SEARCH_WORKER_URL=http://localhost:8001 SEARCH_WORKER_API_KEY=... \
//!   CODE_WORKER_URL=http://localhost:8002 \
//!     cargo run --example dispatch -- searchWeb '{"query": "capital of France"}'
//!   cargo run --example dispatch -- --list
//!   cargo run --example dispatch -- --find python
//!
//! Ctrl-C cancels the in-flight call.

use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tool_orchestrator::{
    builtin_registry, CodeExecutionWorker, DispatchConfig, DispatchEvent, Dispatcher,
    SearchWorker, ToolCallRequest,
};

#[derive(Parser)]
#[command(name = "dispatch", about = "Dispatch a tool call to its worker")]
struct Cli {
    /// Tool name, e.g. "searchWeb" or "executeCode"
    tool: Option<String>,

    /// Arguments as a JSON object
    #[arg(default_value = "{}")]
    args: String,

    /// Budget for lookup tools, in seconds
    #[arg(long, default_value_t = 30)]
    lookup_timeout: u64,

    /// Budget for compute tools, in seconds
    #[arg(long, default_value_t = 120)]
    compute_timeout: u64,

    /// Print the tool declarations and exit
    #[arg(long)]
    list: bool,

    /// Search the tool catalog and exit
    #[arg(long)]
    find: Option<String>,
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("\x1b[1;31merror:\x1b[0m {msg}");
    std::process::exit(1);
}

fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {e}>"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let search = SearchWorker::from_env().unwrap_or_else(|e| fail(e));
    let code = CodeExecutionWorker::from_env().unwrap_or_else(|e| fail(e));
    let registry = builtin_registry(search, code).unwrap_or_else(|e| fail(e));

    if cli.list {
        println!("{}", pretty(&registry.declarations()));
        return;
    }
    if let Some(ref query) = cli.find {
        println!("{}", pretty(&registry.search(query)));
        return;
    }

    let Some(tool) = cli.tool.clone() else {
        fail("no tool given (try --list)");
    };
    let args: Value = serde_json::from_str(&cli.args)
        .unwrap_or_else(|e| fail(format!("arguments are not valid JSON: {e}")));

    let config = DispatchConfig::default()
        .with_lookup_timeout(Duration::from_secs(cli.lookup_timeout))
        .with_compute_timeout(Duration::from_secs(cli.compute_timeout));

    let (tx, mut rx) = tokio::sync::mpsc::channel::<DispatchEvent>(16);
    let dispatcher = Dispatcher::new(registry, config).with_events(tx);

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                DispatchEvent::Started { tool, attempt, .. } => {
                    eprintln!("\x1b[33m  [dispatch: {tool}]\x1b[0m attempt {attempt}");
                }
                DispatchEvent::Finished {
                    tool,
                    failure,
                    latency,
                    ..
                } => {
                    let tag = failure.map_or("success".to_string(), |k| k.to_string());
                    eprintln!("\x1b[2m  [{tag}: {tool} in {latency:?}]\x1b[0m");
                }
            }
        }
    });

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let request = ToolCallRequest::new(tool, args);
    let result = dispatcher.dispatch_with_cancel(&request, &cancel).await;

    drop(dispatcher);
    printer.await.ok();

    println!("{}", pretty(&result));
    if !result.is_success() {
        std::process::exit(2);
    }
}
