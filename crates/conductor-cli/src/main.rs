use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

use conductor_core::impls::TracingEventSink;
use conductor_core::{
    DispatcherBuilder, DispatcherConfig, ExecutionError, Executor, Task, Worker, WorkflowStep,
};

#[derive(Debug, Deserialize)]
struct EchoPayload {
    #[serde(default)]
    text: String,
}

/// payload.text をそのまま返す
struct EchoExecutor;

#[async_trait]
impl Executor for EchoExecutor {
    async fn execute(&self, task: &Task) -> Result<Value, ExecutionError> {
        let p: EchoPayload = serde_json::from_value(task.payload().clone())?;
        Ok(json!({ "kind": task.kind(), "echoed": p.text }))
    }
}

/// 最初の n 回はわざと失敗する
struct FlakyExecutor {
    remaining_failures: AtomicU32,
}

impl FlakyExecutor {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Executor for FlakyExecutor {
    async fn execute(&self, _task: &Task) -> Result<Value, ExecutionError> {
        // 0 で止まる。並行に呼ばれても負にならない
        let taken = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        match taken {
            Ok(left) => Err(ExecutionError::new(format!(
                "intentional failure (left={left})"
            ))),
            Err(_) => Ok(json!({ "ok": true })),
        }
    }
}

fn default_workflow() -> Vec<WorkflowStep> {
    vec![
        WorkflowStep::new("echo", json!({ "text": "hello" })),
        WorkflowStep::new("blog_post", json!({ "text": "draft" })).on_worker("echo"),
        WorkflowStep::new("flaky", json!({})),
        WorkflowStep::new("flaky", json!({})).stop_on_failure(),
        WorkflowStep::new("echo", json!({ "text": "done" })),
    ]
}

fn load_workflow(path: &Path) -> anyhow::Result<Vec<WorkflowStep>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading workflow {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing workflow {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // usage: conductor-cli [config.json] [workflow.json] [flaky_failures]
    let mut args = std::env::args().skip(1);
    let config = match args.next().map(PathBuf::from) {
        Some(path) => DispatcherConfig::from_json_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DispatcherConfig::default(),
    };
    let steps = match args.next().map(PathBuf::from) {
        Some(path) => load_workflow(&path)?,
        None => default_workflow(),
    };
    let flaky_failures: u32 = match args.next() {
        Some(n) => n
            .parse()
            .with_context(|| format!("flaky_failures must be a number, got {n:?}"))?,
        None => 2,
    };

    // (A) worker を登録して dispatcher を組み立てる
    let dispatcher = DispatcherBuilder::new()
        .config(config)
        .register(Worker::new("echo", ["echo", "blog_post"], EchoExecutor))
        .register(Worker::new("flaky", ["flaky"], FlakyExecutor::new(flaky_failures)))
        .event_sink(Arc::new(TracingEventSink))
        .expect_kinds(&["echo", "blog_post"])
        .build()?;

    // (B) pump loop を起動
    dispatcher.start().await?;

    // (C) workflow を実行
    let results = dispatcher.run_workflow(&steps).await;
    tracing::info!(steps = steps.len(), finished = results.len(), "workflow finished");
    for task in &results {
        println!("{}", serde_json::to_string(task)?);
    }

    // (D) 集計を出して止める
    println!("{}", serde_json::to_string_pretty(&dispatcher.status().await)?);
    dispatcher.stop().await;

    Ok(())
}
