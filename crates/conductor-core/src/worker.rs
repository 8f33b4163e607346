//! Worker: a named, capability-declaring executor that owns its tasks.
//!
//! - `Executor` is the collaborator-supplied business logic (`execute`).
//! - `Worker` wraps an executor and drives each task through the state
//!   machine (`process_task`). This is the only place that advances a task's
//!   status, so every executor gets the same failure handling.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{ExecutionError, Task, TaskEvent, TaskId, TaskKind, TaskStatus};
use crate::ports::{Clock, EventSink, IdGenerator, NoopEventSink, SystemClock, UlidGenerator};

/// Business logic for one or more task kinds.
///
/// Gets an immutable view of the task, so it cannot touch status or
/// timestamps. Return the result payload, or an error whose message is
/// recorded on the task.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<serde_json::Value, ExecutionError>;
}

/// Adapts an async closure into an `Executor`.
///
/// The closure receives an owned copy of the task.
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Executor for FnExecutor<F>
where
    F: Fn(Task) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, ExecutionError>> + Send,
{
    async fn execute(&self, task: &Task) -> Result<serde_json::Value, ExecutionError> {
        (self.f)(task.clone()).await
    }
}

/// Insertion-ordered task table.
#[derive(Default)]
struct TaskTable {
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, Task>,
}

impl TaskTable {
    fn insert(&mut self, task: Task) {
        let id = task.id();
        if self.tasks.insert(id, task).is_none() {
            self.order.push(id);
        }
    }

    fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }
}

/// Per-status counts over one worker's table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct Worker {
    name: String,
    capabilities: BTreeSet<TaskKind>,
    executor: Arc<dyn Executor>,
    tasks: RwLock<TaskTable>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
}

impl Worker {
    pub fn new<I, K, E>(name: impl Into<String>, capabilities: I, executor: E) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<TaskKind>,
        E: Executor + 'static,
    {
        Self::with_executor(name, capabilities, Arc::new(executor))
    }

    pub fn with_executor<I, K>(
        name: impl Into<String>,
        capabilities: I,
        executor: Arc<dyn Executor>,
    ) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<TaskKind>,
    {
        Self {
            name: name.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            executor,
            tasks: RwLock::new(TaskTable::default()),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            events: Arc::new(NoopEventSink),
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &TaskKind> {
        self.capabilities.iter()
    }

    pub fn can_handle(&self, kind: &TaskKind) -> bool {
        self.capabilities.contains(kind)
    }

    /// Allocate a `Pending` task and register it in this worker's table.
    pub async fn create_task(&self, kind: TaskKind, payload: serde_json::Value) -> Task {
        let now = self.clock.now();
        let task = Task::new(self.ids.generate_task_id(), kind, payload, now);
        self.tasks.write().await.insert(task.clone());

        self.events.emit(&TaskEvent::Created {
            task_id: task.id(),
            kind: task.kind().clone(),
            worker: self.name.clone(),
            at: now,
        });
        task
    }

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Tasks in creation order, optionally filtered by status.
    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        self.tasks
            .read()
            .await
            .iter()
            .filter(|task| status.is_none_or(|s| task.status() == s))
            .cloned()
            .collect()
    }

    pub async fn counts(&self) -> TaskCounts {
        let table = self.tasks.read().await;
        let mut counts = TaskCounts::default();
        for task in table.iter() {
            match task.status() {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Drive one task to a terminal state.
    ///
    /// 1. kind を扱えなければ Running を経由せず Failed
    /// 2. Running + started_at
    /// 3. execute（ロックは持たない）
    /// 4. 成功なら Completed + result、失敗なら Failed + error
    ///
    /// Returns the task as it stands afterwards, or `None` if this worker
    /// has no task with that id.
    pub async fn process_task(&self, task_id: TaskId) -> Option<Task> {
        let snapshot = {
            let mut table = self.tasks.write().await;
            let task = table.get_mut(task_id)?;

            if !self.can_handle(task.kind()) {
                let message = format!(
                    "worker {} cannot handle task kind {}",
                    self.name,
                    task.kind()
                );
                let now = self.clock.now();
                if let Err(err) = task.reject(now, message.clone()) {
                    tracing::warn!(worker = %self.name, %task_id, %err, "cannot reject task");
                    return Some(task.clone());
                }
                let rejected = task.clone();
                drop(table);

                tracing::warn!(worker = %self.name, %task_id, kind = %rejected.kind(), "capability mismatch");
                self.events.emit(&TaskEvent::Failed {
                    task_id,
                    worker: self.name.clone(),
                    error: message,
                    at: now,
                });
                return Some(rejected);
            }

            if let Err(err) = task.mark_running(self.clock.now()) {
                // 二重投入など。すでに誰かが触ったタスクには手を出さない
                tracing::warn!(worker = %self.name, %task_id, %err, "task is not pending, skipping");
                return Some(task.clone());
            }
            task.clone()
        };

        tracing::info!(worker = %self.name, %task_id, kind = %snapshot.kind(), "starting task");
        if let Some(at) = snapshot.started_at() {
            self.events.emit(&TaskEvent::Started {
                task_id,
                worker: self.name.clone(),
                at,
            });
        }

        let outcome = self.run_executor(snapshot).await;

        let (finished, event) = {
            let mut table = self.tasks.write().await;
            let task = table.get_mut(task_id)?;
            let now = self.clock.now();
            let event = match outcome {
                Ok(result) => task.mark_completed(now, result).map(|()| TaskEvent::Completed {
                    task_id,
                    worker: self.name.clone(),
                    at: now,
                }),
                Err(err) => {
                    let message = err.to_string();
                    task.mark_failed(now, message.clone())
                        .map(|()| TaskEvent::Failed {
                            task_id,
                            worker: self.name.clone(),
                            error: message,
                            at: now,
                        })
                }
            };
            (task.clone(), event)
        };

        match event {
            Ok(event) => {
                match finished.status() {
                    TaskStatus::Completed => {
                        tracing::info!(worker = %self.name, %task_id, "task completed")
                    }
                    _ => tracing::error!(
                        worker = %self.name,
                        %task_id,
                        error = finished.error().unwrap_or_default(),
                        "task failed"
                    ),
                }
                self.events.emit(&event);
            }
            Err(err) => {
                tracing::error!(worker = %self.name, %task_id, %err, "could not record task outcome");
            }
        }
        Some(finished)
    }

    /// Runs `execute` on its own tokio task so a panicking executor is
    /// recorded as a failure instead of taking the pump loop down with it.
    async fn run_executor(&self, task: Task) -> Result<serde_json::Value, ExecutionError> {
        let executor = Arc::clone(&self.executor);
        match tokio::spawn(async move { executor.execute(&task).await }).await {
            Ok(outcome) => outcome,
            Err(join_err) if join_err.is_panic() => {
                Err(ExecutionError::new("executor panicked"))
            }
            Err(join_err) => Err(ExecutionError::new(format!(
                "executor was cancelled: {join_err}"
            ))),
        }
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryEventSink;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;

    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        async fn execute(&self, task: &Task) -> Result<serde_json::Value, ExecutionError> {
            Ok(json!({ "echoed": task.payload()["text"] }))
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl Executor for FailingExecutor {
        async fn execute(&self, _task: &Task) -> Result<serde_json::Value, ExecutionError> {
            Err(ExecutionError::new("boom"))
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl Executor for PanickingExecutor {
        async fn execute(&self, _task: &Task) -> Result<serde_json::Value, ExecutionError> {
            panic!("executor bug");
        }
    }

    /// Advances the shared clock while "working" so timestamps differ.
    struct SlowExecutor {
        clock: Arc<FixedClock>,
    }

    #[async_trait]
    impl Executor for SlowExecutor {
        async fn execute(&self, _task: &Task) -> Result<serde_json::Value, ExecutionError> {
            self.clock.advance(Duration::seconds(2));
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn create_task_registers_pending_task() {
        let worker = Worker::new("w1", ["echo"], EchoExecutor);
        let task = worker
            .create_task(TaskKind::new("echo"), json!({"text": "hi"}))
            .await;

        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(worker.get_task(task.id()).await, Some(task));
    }

    #[tokio::test]
    async fn process_task_completes_with_result() {
        let worker = Worker::new("w1", ["echo"], EchoExecutor);
        let task = worker
            .create_task(TaskKind::new("echo"), json!({"text": "hi"}))
            .await;

        let done = worker.process_task(task.id()).await.unwrap();

        assert_eq!(done.status(), TaskStatus::Completed);
        assert_eq!(done.result(), Some(&json!({"echoed": "hi"})));
        assert!(done.error().is_none());
        // テーブル側も更新されている
        assert_eq!(worker.get_task(task.id()).await, Some(done));
    }

    #[tokio::test]
    async fn process_task_records_execution_failure() {
        let worker = Worker::new("w2", ["fail"], FailingExecutor);
        let task = worker.create_task(TaskKind::new("fail"), json!({})).await;

        let done = worker.process_task(task.id()).await.unwrap();

        assert_eq!(done.status(), TaskStatus::Failed);
        assert_eq!(done.error(), Some("boom"));
        assert!(done.result().is_none());
        assert!(done.started_at().is_some());
        assert!(done.completed_at().is_some());
    }

    #[tokio::test]
    async fn capability_mismatch_fails_without_running() {
        let worker = Worker::new("w1", ["echo"], EchoExecutor);
        let task = worker.create_task(TaskKind::new("other"), json!({})).await;

        let done = worker.process_task(task.id()).await.unwrap();

        assert_eq!(done.status(), TaskStatus::Failed);
        assert!(done.started_at().is_none());
        assert_eq!(
            done.error(),
            Some("worker w1 cannot handle task kind other")
        );
    }

    #[tokio::test]
    async fn panicking_executor_is_recorded_as_failure() {
        let worker = Worker::new("w3", ["panic"], PanickingExecutor);
        let task = worker.create_task(TaskKind::new("panic"), json!({})).await;

        let done = worker.process_task(task.id()).await.unwrap();

        assert_eq!(done.status(), TaskStatus::Failed);
        assert_eq!(done.error(), Some("executor panicked"));
    }

    #[tokio::test]
    async fn processing_a_terminal_task_again_is_a_no_op() {
        let worker = Worker::new("w1", ["echo"], EchoExecutor);
        let task = worker
            .create_task(TaskKind::new("echo"), json!({"text": "hi"}))
            .await;

        let first = worker.process_task(task.id()).await.unwrap();
        let second = worker.process_task(task.id()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn unknown_task_id_returns_none() {
        let other = Worker::new("w1", ["echo"], EchoExecutor);
        let task = other.create_task(TaskKind::new("echo"), json!({})).await;

        let worker = Worker::new("w2", ["echo"], EchoExecutor);
        assert!(worker.process_task(task.id()).await.is_none());
        assert!(worker.get_task(task.id()).await.is_none());
    }

    #[tokio::test]
    async fn timestamps_are_ordered() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(FixedClock::new(start));
        let worker = Worker::new(
            "slow",
            ["slow"],
            SlowExecutor {
                clock: Arc::clone(&clock),
            },
        )
        .clock(clock.clone());

        let task = worker.create_task(TaskKind::new("slow"), json!({})).await;
        clock.advance(Duration::seconds(1));
        let done = worker.process_task(task.id()).await.unwrap();

        let created = done.created_at();
        let started = done.started_at().unwrap();
        let completed = done.completed_at().unwrap();
        assert_eq!(created, start);
        assert_eq!(started, start + Duration::seconds(1));
        assert_eq!(completed, start + Duration::seconds(3));
        assert!(completed >= started && started >= created);
    }

    #[tokio::test]
    async fn list_tasks_keeps_creation_order_and_filters() {
        let worker = Worker::new("w1", ["echo"], EchoExecutor);
        let a = worker.create_task(TaskKind::new("echo"), json!({"text": "a"})).await;
        let b = worker.create_task(TaskKind::new("echo"), json!({"text": "b"})).await;
        let c = worker.create_task(TaskKind::new("echo"), json!({"text": "c"})).await;
        worker.process_task(b.id()).await;

        let all: Vec<TaskId> = worker.list_tasks(None).await.iter().map(Task::id).collect();
        assert_eq!(all, vec![a.id(), b.id(), c.id()]);

        let pending: Vec<TaskId> = worker
            .list_tasks(Some(TaskStatus::Pending))
            .await
            .iter()
            .map(Task::id)
            .collect();
        assert_eq!(pending, vec![a.id(), c.id()]);

        let counts = worker.counts().await;
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.completed, 1);
    }

    #[tokio::test]
    async fn emits_lifecycle_events_in_order() {
        let sink = Arc::new(InMemoryEventSink::new());
        let worker = Worker::new("w2", ["fail"], FailingExecutor).event_sink(sink.clone());
        let task = worker.create_task(TaskKind::new("fail"), json!({})).await;
        worker.process_task(task.id()).await;

        let names: Vec<&str> = sink.events().iter().map(TaskEvent::name).collect();
        assert_eq!(names, vec!["created", "started", "failed"]);
        assert!(sink.events().iter().all(|e| e.task_id() == task.id()));
    }

    #[tokio::test]
    async fn fn_executor_adapts_closures() {
        let worker = Worker::new(
            "upper",
            ["upper"],
            FnExecutor::new(|task: Task| async move {
                let text = task.payload()["text"]
                    .as_str()
                    .ok_or_else(|| ExecutionError::new("missing text"))?;
                Ok::<_, ExecutionError>(json!({ "upper": text.to_uppercase() }))
            }),
        );

        let ok = worker.create_task(TaskKind::new("upper"), json!({"text": "hi"})).await;
        let bad = worker.create_task(TaskKind::new("upper"), json!({})).await;

        let ok = worker.process_task(ok.id()).await.unwrap();
        let bad = worker.process_task(bad.id()).await.unwrap();
        assert_eq!(ok.result(), Some(&json!({"upper": "HI"})));
        assert_eq!(bad.error(), Some("missing text"));
    }
}
