//! PumpPool - キューを消費してタスクを worker に流すループ群
//!
//! # フロー（1 イテレーション）
//! 1. WorkQueue::pop()（poll interval で timeout）
//! 2. timeout なら running フラグを見直して次へ
//! 3. worker 名から Worker を引く（見つからなければログを出して捨てる）
//! 4. Worker::process_task() で終端状態まで進める
//! 5. 結果を completed / failed の ledger に追記

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;

use crate::app::registry::WorkerRegistry;
use crate::domain::{Task, TaskStatus};
use crate::ports::{WorkItem, WorkQueue};

/// Append-only records of finished tasks, in completion order.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    pub completed: Vec<Task>,
    pub failed: Vec<Task>,
}

impl Ledger {
    pub fn record(&mut self, task: Task) {
        match task.status() {
            TaskStatus::Completed => self.completed.push(task),
            TaskStatus::Failed => self.failed.push(task),
            status => {
                tracing::warn!(task_id = %task.id(), %status, "not recording non-terminal task");
            }
        }
    }
}

/// State shared by the dispatcher and every pump loop.
pub(crate) struct PumpContext {
    pub registry: RwLock<WorkerRegistry>,
    pub queue: Arc<dyn WorkQueue>,
    pub ledger: Mutex<Ledger>,
    pub poll_interval: Duration,
}

impl PumpContext {
    async fn handle(&self, loop_id: usize, item: WorkItem) {
        let worker = self.registry.read().await.get(&item.worker).cloned();
        let Some(worker) = worker else {
            tracing::warn!(
                loop_id,
                worker = %item.worker,
                task_id = %item.task_id,
                "worker is no longer registered, dropping item"
            );
            return;
        };

        tracing::debug!(loop_id, worker = %item.worker, task_id = %item.task_id, "processing task");
        let Some(task) = worker.process_task(item.task_id).await else {
            tracing::warn!(
                loop_id,
                worker = %item.worker,
                task_id = %item.task_id,
                "worker does not own task, dropping item"
            );
            return;
        };

        self.ledger.lock().await.record(task);
    }
}

/// Pump loop group handle.
/// - `shutdown_tx` を drop してもループ全体が止まる
/// - `shutdown_and_join()` で全ループの終了を待てる
pub(crate) struct PumpPool {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl PumpPool {
    /// Spawn `n` pump loops.
    pub fn spawn(n: usize, ctx: Arc<PumpContext>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for loop_id in 0..n {
            let ctx = Arc::clone(&ctx);
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(pump_loop(loop_id, ctx, rx)));
        }

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    /// Stop taking new work. In-flight tasks are not cancelled.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(%err, "pump loop terminated abnormally");
            }
        }
    }
}

async fn pump_loop(loop_id: usize, ctx: Arc<PumpContext>, mut shutdown_rx: watch::Receiver<bool>) {
    tracing::info!(loop_id, "pump loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // pop は待つ可能性があるので shutdown と競合させる
        let item = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    // pool handle ごと drop された
                    break;
                }
                continue;
            }
            item = ctx.queue.pop(ctx.poll_interval) => item,
        };

        let Some(item) = item else {
            continue;
        };

        // ここから先は shutdown を見ない。実行中のタスクは最後まで走らせる
        ctx.handle(loop_id, item).await;
    }

    tracing::info!(loop_id, "pump loop stopped");
}
