//! Dispatcher - routing, queueing, the pump pool and status aggregation.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::app::pump_loop::{Ledger, PumpContext, PumpPool};
use crate::app::registry::WorkerRegistry;
use crate::app::status::{StatusSnapshot, WorkerStatus, success_rate};
use crate::app::workflow::{WorkflowRunner, WorkflowStep};
use crate::config::DispatcherConfig;
use crate::domain::{PoolError, RoutingError, Task, TaskId, TaskKind};
use crate::impls::InMemoryWorkQueue;
use crate::ports::{EventSink, WorkItem, WorkQueue};
use crate::worker::Worker;

/// Cheap, cloneable handle to one dispatcher.
///
/// Every clone talks to the same registry, queue and ledgers. When the last
/// handle is dropped the pump loops are told to shut down; call `stop()` to
/// also wait for them.
///
/// # 使用例
/// ```ignore
/// let dispatcher = Dispatcher::new(DispatcherConfig::default());
/// dispatcher.register(Worker::new("w1", ["echo"], EchoExecutor)).await;
/// dispatcher.start().await?;
/// let task = dispatcher.submit("echo", json!({"text": "hi"}), None).await?;
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<Shared>,
}

struct Shared {
    config: DispatcherConfig,
    event_sink: Option<Arc<dyn EventSink>>,
    ctx: Arc<PumpContext>,
    pool: Mutex<Option<PumpPool>>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self::with_queue(config, Arc::new(InMemoryWorkQueue::new()))
    }

    pub fn with_queue(config: DispatcherConfig, queue: Arc<dyn WorkQueue>) -> Self {
        Self::from_parts(config, WorkerRegistry::new(), queue, None)
    }

    pub(crate) fn from_parts(
        config: DispatcherConfig,
        registry: WorkerRegistry,
        queue: Arc<dyn WorkQueue>,
        event_sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        let ctx = Arc::new(PumpContext {
            registry: RwLock::new(registry),
            queue,
            ledger: Mutex::new(Ledger::default()),
            poll_interval: config.poll_interval(),
        });
        Self {
            shared: Arc::new(Shared {
                config,
                event_sink,
                ctx,
                pool: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Register a worker. A worker with the same name is replaced.
    ///
    /// If the dispatcher was built with `DispatcherBuilder::event_sink`,
    /// that sink replaces the worker's own.
    pub async fn register(&self, worker: Worker) -> Arc<Worker> {
        let worker = Arc::new(self.attach_sink(worker));
        let replaced = self
            .shared
            .ctx
            .registry
            .write()
            .await
            .register(Arc::clone(&worker));

        let capabilities: Vec<&str> = worker.capabilities().map(TaskKind::as_str).collect();
        if replaced.is_some() {
            tracing::warn!(worker = %worker.name(), ?capabilities, "replaced registered worker");
        } else {
            tracing::info!(worker = %worker.name(), ?capabilities, "registered worker");
        }
        worker
    }

    fn attach_sink(&self, worker: Worker) -> Worker {
        match &self.shared.event_sink {
            Some(sink) => worker.event_sink(Arc::clone(sink)),
            None => worker,
        }
    }

    pub async fn get_worker(&self, name: &str) -> Option<Arc<Worker>> {
        self.shared.ctx.registry.read().await.get(name).cloned()
    }

    /// Registered workers, in registration order.
    pub async fn workers(&self) -> Vec<Arc<Worker>> {
        self.shared.ctx.registry.read().await.iter().cloned().collect()
    }

    /// First registered worker that can handle `kind`.
    pub async fn find_worker_for(&self, kind: &TaskKind) -> Option<Arc<Worker>> {
        self.shared.ctx.registry.read().await.find_for(kind).cloned()
    }

    /// Route a new task to a worker and enqueue it.
    ///
    /// With `worker_name`, that worker must exist and handle `kind`;
    /// otherwise the first capable worker is used. The returned task is
    /// still `Pending`. On error nothing is enqueued.
    pub async fn submit(
        &self,
        kind: impl Into<TaskKind>,
        payload: serde_json::Value,
        worker_name: Option<&str>,
    ) -> Result<Task, RoutingError> {
        self.submit_routed(kind.into(), payload, worker_name)
            .await
            .map(|(_, task)| task)
    }

    /// Like `submit`, but also hands back the worker that owns the task.
    pub(crate) async fn submit_routed(
        &self,
        kind: TaskKind,
        payload: serde_json::Value,
        worker_name: Option<&str>,
    ) -> Result<(Arc<Worker>, Task), RoutingError> {
        let worker = match self.route(&kind, worker_name).await {
            Ok(worker) => worker,
            Err(err) => {
                tracing::error!(%kind, worker = ?worker_name, %err, "cannot route task");
                return Err(err);
            }
        };

        let task = worker.create_task(kind, payload).await;
        self.shared
            .ctx
            .queue
            .push(WorkItem::new(worker.name(), task.id()))
            .await;

        tracing::info!(task_id = %task.id(), worker = %worker.name(), kind = %task.kind(), "submitted task");
        Ok((worker, task))
    }

    async fn route(
        &self,
        kind: &TaskKind,
        worker_name: Option<&str>,
    ) -> Result<Arc<Worker>, RoutingError> {
        let registry = self.shared.ctx.registry.read().await;
        match worker_name {
            Some(name) => {
                let worker = registry
                    .get(name)
                    .ok_or_else(|| RoutingError::UnknownWorker(name.to_string()))?;
                if !worker.can_handle(kind) {
                    return Err(RoutingError::WorkerCannotHandle {
                        worker: name.to_string(),
                        kind: kind.clone(),
                    });
                }
                Ok(Arc::clone(worker))
            }
            None => registry
                .find_for(kind)
                .cloned()
                .ok_or_else(|| RoutingError::NoCapableWorker(kind.clone())),
        }
    }

    /// Look a task up across every worker's table.
    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        for worker in self.workers().await {
            if let Some(task) = worker.get_task(id).await {
                return Some(task);
            }
        }
        None
    }

    /// Start `config.pool_size` pump loops.
    pub async fn start(&self) -> Result<(), PoolError> {
        self.start_pool(self.shared.config.pool_size).await
    }

    /// Start `n` pump loops pulling from the shared queue.
    pub async fn start_pool(&self, n: usize) -> Result<(), PoolError> {
        if n == 0 {
            return Err(PoolError::EmptyPool);
        }
        let mut pool = self.shared.pool.lock().await;
        if pool.is_some() {
            return Err(PoolError::AlreadyRunning);
        }
        *pool = Some(PumpPool::spawn(n, Arc::clone(&self.shared.ctx)));
        tracing::info!(pool_size = n, "started pump loops");
        Ok(())
    }

    /// Stop accepting work and wait for every pump loop to return.
    ///
    /// Tasks already inside `execute` run to completion. Calling this on a
    /// stopped dispatcher does nothing.
    pub async fn stop(&self) {
        let pool = self.shared.pool.lock().await.take();
        if let Some(pool) = pool {
            let n = pool.len();
            pool.shutdown_and_join().await;
            tracing::info!(pool_size = n, "dispatcher stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.shared.pool.lock().await.is_some()
    }

    pub async fn queue_depth(&self) -> usize {
        self.shared.ctx.queue.len().await
    }

    /// Completed tasks, in completion order.
    pub async fn completed_tasks(&self) -> Vec<Task> {
        self.shared.ctx.ledger.lock().await.completed.clone()
    }

    /// Failed tasks, in completion order.
    pub async fn failed_tasks(&self) -> Vec<Task> {
        self.shared.ctx.ledger.lock().await.failed.clone()
    }

    pub async fn status(&self) -> StatusSnapshot {
        let (completed, failed) = {
            let ledger = self.shared.ctx.ledger.lock().await;
            (ledger.completed.len(), ledger.failed.len())
        };

        let mut workers = Vec::new();
        for worker in self.workers().await {
            let counts = worker.counts().await;
            workers.push(WorkerStatus {
                name: worker.name().to_string(),
                capabilities: worker.capabilities().cloned().collect(),
                pending: counts.pending,
                running: counts.running,
                completed: counts.completed,
                failed: counts.failed,
                success_rate: success_rate(counts.completed, counts.failed),
            });
        }

        StatusSnapshot {
            total_terminal: completed + failed,
            completed,
            failed,
            success_rate: success_rate(completed, failed),
            queue_depth: self.queue_depth().await,
            is_running: self.is_running().await,
            workers,
        }
    }

    /// Run `steps` one after another. See `WorkflowRunner`.
    pub async fn run_workflow(&self, steps: &[WorkflowStep]) -> Vec<Task> {
        WorkflowRunner::new(self.clone()).run(steps).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecutionError, TaskStatus};
    use crate::worker::Executor;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

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

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            pool_size: 2,
            poll_interval_ms: 10,
            workflow_poll_interval_ms: 5,
            workflow_max_wait_ms: Some(2_000),
        }
    }

    async fn dispatcher() -> Dispatcher {
        let d = Dispatcher::new(fast_config());
        d.register(Worker::new("w1", ["echo"], EchoExecutor)).await;
        d.register(Worker::new("w2", ["fail"], FailingExecutor)).await;
        d
    }

    async fn wait_for_terminal(d: &Dispatcher, id: TaskId) -> Task {
        for _ in 0..400 {
            if let Some(task) = d.get_task(id).await
                && task.is_terminal()
            {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} did not finish");
    }

    #[tokio::test]
    async fn submit_routes_by_capability_and_enqueues() {
        let d = dispatcher().await;
        let task = d.submit("echo", json!({"text": "hi"}), None).await.unwrap();

        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(d.queue_depth().await, 1);
        let owner = d.get_worker("w1").await.unwrap();
        assert_eq!(owner.get_task(task.id()).await, Some(task));
    }

    #[tokio::test]
    async fn submit_without_capable_worker_enqueues_nothing() {
        let d = dispatcher().await;
        let err = d.submit("unknown", json!({}), None).await.unwrap_err();

        assert_eq!(err, RoutingError::NoCapableWorker(TaskKind::new("unknown")));
        assert_eq!(d.queue_depth().await, 0);
    }

    #[tokio::test]
    async fn submit_to_named_worker_without_capability_fails() {
        let d = dispatcher().await;
        let err = d.submit("fail", json!({}), Some("w1")).await.unwrap_err();
        assert!(matches!(err, RoutingError::WorkerCannotHandle { ref worker, .. } if worker == "w1"));

        let err = d.submit("echo", json!({}), Some("nobody")).await.unwrap_err();
        assert_eq!(err, RoutingError::UnknownWorker("nobody".to_string()));
        assert_eq!(d.queue_depth().await, 0);
    }

    #[tokio::test]
    async fn submit_to_named_worker_uses_that_worker() {
        let d = dispatcher().await;
        d.register(Worker::new("w3", ["echo"], EchoExecutor)).await;

        let task = d.submit("echo", json!({}), Some("w3")).await.unwrap();
        let w3 = d.get_worker("w3").await.unwrap();
        let w1 = d.get_worker("w1").await.unwrap();
        assert!(w3.get_task(task.id()).await.is_some());
        assert!(w1.get_task(task.id()).await.is_none());
    }

    #[tokio::test]
    async fn pool_processes_into_ledgers() {
        let d = dispatcher().await;
        d.start().await.unwrap();

        let ok = d.submit("echo", json!({"text": "hi"}), None).await.unwrap();
        let bad = d.submit("fail", json!({}), None).await.unwrap();

        let ok = wait_for_terminal(&d, ok.id()).await;
        let bad = wait_for_terminal(&d, bad.id()).await;
        d.stop().await;

        assert_eq!(ok.result(), Some(&json!({"echoed": "hi"})));
        assert_eq!(bad.error(), Some("boom"));

        let completed: Vec<TaskId> = d.completed_tasks().await.iter().map(Task::id).collect();
        let failed: Vec<TaskId> = d.failed_tasks().await.iter().map(Task::id).collect();
        assert_eq!(completed, vec![ok.id()]);
        assert_eq!(failed, vec![bad.id()]);
    }

    #[tokio::test]
    async fn start_pool_rejects_zero_and_double_start() {
        let d = dispatcher().await;
        assert_eq!(d.start_pool(0).await, Err(PoolError::EmptyPool));

        d.start_pool(1).await.unwrap();
        assert_eq!(d.start_pool(1).await, Err(PoolError::AlreadyRunning));
        assert!(d.is_running().await);

        d.stop().await;
        assert!(!d.is_running().await);
        // 停止後は再起動できる
        d.start_pool(1).await.unwrap();
        d.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let d = dispatcher().await;
        d.stop().await;
        d.start().await.unwrap();
        d.stop().await;
        d.stop().await;
        assert!(!d.is_running().await);
    }

    #[tokio::test]
    async fn stopped_pool_leaves_queue_untouched() {
        let d = dispatcher().await;
        d.start().await.unwrap();
        d.stop().await;

        d.submit("echo", json!({"text": "later"}), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(d.queue_depth().await, 1);
        assert_eq!(d.status().await.total_terminal, 0);
    }

    #[tokio::test]
    async fn status_with_no_terminal_tasks_reports_zero_rate() {
        let d = dispatcher().await;
        d.submit("echo", json!({}), None).await.unwrap();

        let status = d.status().await;
        assert_eq!(status.total_terminal, 0);
        assert_eq!(status.success_rate, 0.0);
        assert_eq!(status.queue_depth, 1);
        assert!(!status.is_running);

        let w1 = status.worker("w1").unwrap();
        assert_eq!(w1.pending, 1);
        assert_eq!(w1.success_rate, 0.0);
        assert_eq!(w1.capabilities, vec![TaskKind::new("echo")]);
    }

    #[tokio::test]
    async fn status_aggregates_ledgers_and_worker_tables() {
        let d = dispatcher().await;
        d.start().await.unwrap();

        let mut ids = Vec::new();
        for text in ["a", "b", "c"] {
            ids.push(d.submit("echo", json!({"text": text}), None).await.unwrap().id());
        }
        ids.push(d.submit("fail", json!({}), None).await.unwrap().id());
        for id in &ids {
            wait_for_terminal(&d, *id).await;
        }
        // ledger への追記は process_task の直後なので少し待つ
        for _ in 0..100 {
            if d.status().await.total_terminal == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let status = d.status().await;
        d.stop().await;

        assert_eq!(status.total_terminal, 4);
        assert_eq!(status.completed, 3);
        assert_eq!(status.failed, 1);
        assert!((status.success_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(status.queue_depth, 0);
        assert!(status.is_running);

        let w1 = status.worker("w1").unwrap();
        assert_eq!((w1.completed, w1.failed, w1.running), (3, 0, 0));
        assert_eq!(w1.success_rate, 1.0);
        let w2 = status.worker("w2").unwrap();
        assert_eq!((w2.completed, w2.failed), (0, 1));
        assert_eq!(w2.success_rate, 0.0);
    }

    #[tokio::test]
    async fn replaced_worker_drops_items_queued_for_old_tasks() {
        let d = dispatcher().await;
        let task = d.submit("echo", json!({}), None).await.unwrap();
        // 同名で登録し直すと、古い worker のテーブルにあったタスクは見つからない
        d.register(Worker::new("w1", ["echo"], EchoExecutor)).await;

        d.start().await.unwrap();
        for _ in 0..50 {
            if d.queue_depth().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        d.stop().await;

        assert_eq!(d.queue_depth().await, 0);
        assert!(d.get_task(task.id()).await.is_none());
        let status = d.status().await;
        assert_eq!(status.total_terminal, 0);
    }
}
