//! Workflow - 複数ステップの逐次実行
//!
//! # フロー（ステップごと）
//! 1. Dispatcher に submit（振り分けできなければそのステップは飛ばす）
//! 2. submit 時に決まった worker のテーブルを poll して終端を待つ
//! 3. 結果に追加
//! 4. Failed かつ continue_on_failure = false なら打ち切り

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::app::dispatcher::Dispatcher;
use crate::domain::{Task, TaskKind, TaskStatus};
use crate::worker::Worker;

/// One step of a workflow.
///
/// JSON form: `{"kind": "echo", "payload": {...}, "worker": "w1",
/// "continue_on_failure": false}`. Only `kind` is required; `type` and
/// `agent` are accepted as aliases for `kind` and `worker`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    #[serde(alias = "type")]
    pub kind: TaskKind,
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
    #[serde(default, alias = "agent", skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default = "default_continue_on_failure")]
    pub continue_on_failure: bool,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn default_continue_on_failure() -> bool {
    true
}

impl WorkflowStep {
    pub fn new(kind: impl Into<TaskKind>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            worker: None,
            continue_on_failure: true,
        }
    }

    pub fn on_worker(mut self, name: impl Into<String>) -> Self {
        self.worker = Some(name.into());
        self
    }

    /// Abort the workflow if this step fails.
    pub fn stop_on_failure(mut self) -> Self {
        self.continue_on_failure = false;
        self
    }
}

/// Runs workflow steps through a `Dispatcher`.
///
/// The dispatcher's pump loops must be running, otherwise every step waits
/// until `max_wait` (or forever without one).
pub struct WorkflowRunner {
    dispatcher: Dispatcher,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl WorkflowRunner {
    /// Poll interval and max wait come from the dispatcher's config.
    pub fn new(dispatcher: Dispatcher) -> Self {
        let poll_interval = dispatcher.config().workflow_poll_interval();
        let max_wait = dispatcher.config().workflow_max_wait();
        Self {
            dispatcher,
            poll_interval,
            max_wait,
        }
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Returns the final state of every submitted step, in step order.
    pub async fn run(&self, steps: &[WorkflowStep]) -> Vec<Task> {
        let mut results = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let submitted = self
                .dispatcher
                .submit_routed(step.kind.clone(), step.payload.clone(), step.worker.as_deref())
                .await;
            let (worker, task) = match submitted {
                Ok(routed) => routed,
                Err(err) => {
                    tracing::warn!(step = index, kind = %step.kind, %err, "skipping workflow step");
                    continue;
                }
            };

            let task = self.wait_for_terminal(&worker, task).await;
            let failed = task.status() == TaskStatus::Failed;
            results.push(task);

            if failed && !step.continue_on_failure {
                tracing::info!(step = index, "workflow step failed, stopping");
                break;
            }
        }

        results
    }

    /// Poll the owning worker until the task is terminal, `max_wait`
    /// elapses, or the worker is no longer the one registered under its
    /// name. In the last two cases the task is returned as-is (possibly
    /// still `Pending`/`Running`).
    async fn wait_for_terminal(&self, worker: &Arc<Worker>, mut task: Task) -> Task {
        let deadline = self.max_wait.map(|d| Instant::now() + d);

        while task.status().is_active() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::warn!(
                    task_id = %task.id(),
                    status = %task.status(),
                    "gave up waiting for workflow step"
                );
                break;
            }

            tokio::time::sleep(self.poll_interval).await;

            match worker.get_task(task.id()).await {
                Some(latest) => task = latest,
                None => {
                    tracing::warn!(task_id = %task.id(), worker = %worker.name(), "task vanished from worker");
                    break;
                }
            }

            // 同名で登録し直された worker のキュー項目は pump loop に捨てられる
            let current = self.dispatcher.get_worker(worker.name()).await;
            if task.status().is_active() && !current.is_some_and(|c| Arc::ptr_eq(&c, worker)) {
                tracing::warn!(
                    task_id = %task.id(),
                    worker = %worker.name(),
                    status = %task.status(),
                    "worker was replaced, gave up waiting for workflow step"
                );
                break;
            }
        }

        task
    }
}
